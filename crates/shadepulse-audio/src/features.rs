//! Scalar audio features computed from the latest byte spectrum.

use std::ops::Range;

use shadepulse_core::{AudioSettings, BandSettings};

use crate::frame::AudioFrame;
use crate::source::AudioSource;

/// Bass bins per 1024 spectrum bins (~0-260 Hz for a 2048-point transform at 44.1 kHz).
const BASS_BINS_PER_1024: usize = 12;

/// How bass and treble bin ranges are derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BandLayout {
    /// Bass is the lowest `len * 12 / 1024` bins, treble the top quartile.
    Fractional,
    /// Ranges follow absolute frequencies through the source's sample rate.
    Hz { bass_max_hz: f32, treble_min_hz: f32 },
}

impl From<&BandSettings> for BandLayout {
    fn from(b: &BandSettings) -> Self {
        match *b {
            BandSettings::Fractional => BandLayout::Fractional,
            BandSettings::Hz {
                bass_max_hz,
                treble_min_hz,
            } => BandLayout::Hz {
                bass_max_hz,
                treble_min_hz,
            },
        }
    }
}

/// Pulls spectrum/waveform buffers from an optional [`AudioSource`] and summarises them.
///
/// Buffers are allocated once and overwritten by every [`update`](Self::update). Without a
/// source they read as zero and every feature is zero.
pub struct FeatureExtractor {
    source: Option<Box<dyn AudioSource>>,
    spectrum: Vec<u8>,
    waveform: Vec<u8>,
    bands: BandLayout,
    fallback_sample_rate: f32,
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("connected", &self.source.is_some())
            .field("spectrum_len", &self.spectrum.len())
            .field("waveform_len", &self.waveform.len())
            .field("bands", &self.bands)
            .finish()
    }
}

impl FeatureExtractor {
    pub fn new(settings: &AudioSettings) -> Self {
        Self {
            source: None,
            spectrum: vec![0; settings.spectrum_len()],
            waveform: vec![0; settings.waveform_len()],
            bands: BandLayout::from(&settings.bands),
            fallback_sample_rate: settings.fallback_sample_rate,
        }
    }

    pub fn connect<S: AudioSource + 'static>(&mut self, source: S) {
        self.source = Some(Box::new(source));
    }

    /// Detaches the current source; subsequent updates zero-fill.
    pub fn disconnect(&mut self) -> Option<Box<dyn AudioSource>> {
        self.source.take()
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    pub fn set_band_layout(&mut self, bands: BandLayout) {
        self.bands = bands;
    }

    /// Refreshes both buffers from the source, or zero-fills them when disconnected.
    pub fn update(&mut self) {
        match self.source.as_mut() {
            Some(src) => {
                src.fill_spectrum(&mut self.spectrum);
                src.fill_waveform(&mut self.waveform);
            }
            None => {
                self.spectrum.fill(0);
                self.waveform.fill(0);
            }
        }
    }

    pub fn spectrum(&self) -> &[u8] {
        &self.spectrum
    }

    pub fn waveform(&self) -> &[u8] {
        &self.waveform
    }

    pub fn sample_rate(&self) -> f32 {
        self.source
            .as_ref()
            .map(|s| s.sample_rate())
            .unwrap_or(self.fallback_sample_rate)
    }

    /// Maps a frequency to its spectrum bin, clamped to the valid range.
    pub fn frequency_bin(&self, hz: f32) -> usize {
        let bins = self.spectrum.len();
        if bins == 0 {
            return 0;
        }
        let nyquist = self.sample_rate() * 0.5;
        let bin = (hz.max(0.0) / nyquist * bins as f32).round() as usize;
        bin.min(bins - 1)
    }

    pub fn bass_range(&self) -> Range<usize> {
        let len = self.spectrum.len();
        match self.bands {
            BandLayout::Fractional => 0..(len * BASS_BINS_PER_1024 / 1024).max(1).min(len),
            BandLayout::Hz { bass_max_hz, .. } => {
                if len == 0 {
                    0..0
                } else {
                    0..self.frequency_bin(bass_max_hz) + 1
                }
            }
        }
    }

    pub fn treble_range(&self) -> Range<usize> {
        let len = self.spectrum.len();
        match self.bands {
            BandLayout::Fractional => len * 3 / 4..len,
            BandLayout::Hz { treble_min_hz, .. } => self.frequency_bin(treble_min_hz).min(len)..len,
        }
    }

    /// RMS of normalised magnitudes over the whole spectrum.
    pub fn energy(&self) -> f32 {
        rms(&self.spectrum)
    }

    pub fn bass(&self) -> f32 {
        rms(&self.spectrum[self.bass_range()])
    }

    pub fn treble(&self) -> f32 {
        rms(&self.spectrum[self.treble_range()])
    }

    /// Snapshot of this frame's features, borrowing the reused buffers.
    pub fn frame(&self) -> AudioFrame<'_> {
        AudioFrame {
            spectrum: &self.spectrum,
            waveform: &self.waveform,
            energy: self.energy(),
            bass: self.bass(),
            treble: self.treble(),
        }
    }
}

fn rms(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: f32 = bins
        .iter()
        .map(|&b| {
            let v = b as f32 / 255.0;
            v * v
        })
        .sum();
    (sum / bins.len() as f32).sqrt()
}
