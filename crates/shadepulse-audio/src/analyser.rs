//! Byte spectrum/waveform analysis over raw samples.
//!
//! Mirrors the behaviour of a browser analyser node so presets written against byte spectra
//! look the same here: Blackman window, magnitude normalised by the transform size, exponential
//! smoothing across calls, then decibels mapped linearly onto `0..=255`.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use shadepulse_core::AudioSettings;

pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size())
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}

impl Analyser {
    pub fn new(settings: &AudioSettings) -> Self {
        let n = settings.fft_size.max(2);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            fft,
            window: blackman(n),
            buffer: vec![Complex::new(0.0, 0.0); n],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            smoothed: vec![0.0; n / 2],
            smoothing: settings.smoothing.clamp(0.0, 0.999),
            min_decibels: settings.min_decibels,
            max_decibels: settings.max_decibels,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Computes the byte spectrum of the most recent `fft_size` samples.
    ///
    /// `samples` shorter than the transform are treated as left-padded with silence. `out` gets
    /// `min(out.len(), bin_count())` bins; any remaining entries are zeroed.
    pub fn spectrum_bytes(&mut self, samples: &[f32], out: &mut [u8]) {
        let n = self.fft_size();
        let tail = &samples[samples.len().saturating_sub(n)..];
        let pad = n - tail.len();

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { tail[i - pad] };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let norm = 1.0 / n as f32;
        let tau = self.smoothing;
        let range = self.max_decibels - self.min_decibels;

        for (k, out_bin) in out.iter_mut().enumerate() {
            if k >= self.smoothed.len() {
                *out_bin = 0;
                continue;
            }
            let magnitude = self.buffer[k].norm() * norm;
            let s = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            self.smoothed[k] = s;

            *out_bin = if s > 0.0 {
                let db = 20.0 * s.log10();
                (255.0 * (db - self.min_decibels) / range).clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
    }

    /// Maps samples in `[-1, 1]` onto bytes centered at 128 (most recent samples last).
    pub fn waveform_bytes(samples: &[f32], out: &mut [u8]) {
        let tail = &samples[samples.len().saturating_sub(out.len())..];
        let pad = out.len() - tail.len();
        for (i, b) in out.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { tail[i - pad] };
            *b = (128.0 * (1.0 + s)).clamp(0.0, 255.0) as u8;
        }
    }

    /// Forgets smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

fn blackman(n: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            A0 - A1 * (2.0 * PI * x).cos() + A2 * (4.0 * PI * x).cos()
        })
        .collect()
}
