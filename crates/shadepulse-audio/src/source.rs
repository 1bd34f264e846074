use std::sync::{Arc, Mutex, MutexGuard};

use shadepulse_core::AudioSettings;

use crate::analyser::Analyser;

/// Where the extractor pulls its per-frame buffers from.
///
/// Implementations must not block for long: `fill_*` is called on the render thread every frame.
pub trait AudioSource {
    /// Sample rate of the underlying signal, used for frequency-to-bin mapping.
    fn sample_rate(&self) -> f32;

    /// Writes byte magnitudes (0..=255) into `out`, one per frequency bin.
    fn fill_spectrum(&mut self, out: &mut [u8]);

    /// Writes byte samples (0..=255, centered at 128) into `out`, most recent last.
    fn fill_waveform(&mut self, out: &mut [u8]);
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn sample_rate(&self) -> f32 {
        (**self).sample_rate()
    }
    fn fill_spectrum(&mut self, out: &mut [u8]) {
        (**self).fill_spectrum(out)
    }
    fn fill_waveform(&mut self, out: &mut [u8]) {
        (**self).fill_waveform(out)
    }
}

#[derive(Debug)]
struct Ring {
    buf: Vec<f32>,
    head: usize,
}

/// Fixed-capacity ring of the most recent mono samples, shareable across threads.
///
/// Cloning yields another handle to the same ring: the writer side (an audio callback) and the
/// reader side (a [`StreamSource`]) each hold one.
#[derive(Debug, Clone)]
pub struct SampleRing {
    inner: Arc<Mutex<Ring>>,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Ring {
                buf: vec![0.0; capacity.max(1)],
                head: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // A panicking writer cannot leave the ring structurally broken; keep reading.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn push(&self, samples: &[f32]) {
        let mut ring = self.lock();
        for &s in samples {
            let head = ring.head;
            ring.buf[head] = s;
            ring.head = (head + 1) % ring.buf.len();
        }
    }

    /// Pushes interleaved frames, averaging `channels` channels down to mono.
    pub fn push_interleaved<T: Copy>(&self, data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) {
        let channels = channels.max(1);
        let mut ring = self.lock();
        for frame in data.chunks_exact(channels) {
            let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
            let head = ring.head;
            ring.buf[head] = sum / channels as f32;
            ring.head = (head + 1) % ring.buf.len();
        }
    }

    /// Copies the newest `out.len()` samples, oldest first. Missing history reads as silence.
    pub fn copy_latest(&self, out: &mut [f32]) {
        let ring = self.lock();
        let cap = ring.buf.len();
        let n = out.len().min(cap);
        let pad = out.len() - n;

        out[..pad].iter_mut().for_each(|s| *s = 0.0);
        let start = (ring.head + cap - n) % cap;
        for (i, slot) in out[pad..].iter_mut().enumerate() {
            *slot = ring.buf[(start + i) % cap];
        }
    }

    pub fn clear(&self) {
        let mut ring = self.lock();
        ring.buf.iter_mut().for_each(|s| *s = 0.0);
        ring.head = 0;
    }
}

/// An [`AudioSource`] reading from a [`SampleRing`] through an [`Analyser`].
#[derive(Debug)]
pub struct StreamSource {
    ring: SampleRing,
    analyser: Analyser,
    samples: Vec<f32>,
    sample_rate: f32,
}

impl StreamSource {
    pub fn new(ring: SampleRing, sample_rate: f32, settings: &AudioSettings) -> Self {
        let analyser = Analyser::new(settings);
        let samples = vec![0.0; analyser.fft_size()];
        Self {
            ring,
            analyser,
            samples,
            sample_rate,
        }
    }

    pub fn ring(&self) -> &SampleRing {
        &self.ring
    }
}

impl AudioSource for StreamSource {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn fill_spectrum(&mut self, out: &mut [u8]) {
        self.ring.copy_latest(&mut self.samples);
        self.analyser.spectrum_bytes(&self.samples, out);
    }

    fn fill_waveform(&mut self, out: &mut [u8]) {
        self.ring.copy_latest(&mut self.samples);
        Analyser::waveform_bytes(&self.samples, out);
    }
}
