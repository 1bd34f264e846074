//! Energy-based beat detection with an adaptive threshold over a sliding window.

use std::collections::VecDeque;

use shadepulse_core::BeatSettings;

/// Bounded FIFO of recent energy samples. Never grows past its capacity.
#[derive(Debug, Clone)]
pub struct EnergyHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl EnergyHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, energy: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(energy);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    /// Root of the mean squared deviation from `mean`.
    pub fn deviation(&self, mean: f32) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sq: f32 = self.samples.iter().map(|h| (h - mean) * (h - mean)).sum();
        (sq / self.samples.len() as f32).sqrt()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Observable detector output for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatState {
    pub is_beat: bool,
    /// `max(0, (energy - mean) / mean)` once the history is full, otherwise 0.
    pub strength: f32,
    /// Timestamp (ms) of the last emitted beat.
    pub last_beat_ms: Option<f64>,
}

impl Default for BeatState {
    fn default() -> Self {
        Self {
            is_beat: false,
            strength: 0.0,
            last_beat_ms: None,
        }
    }
}

/// Flags a beat when energy rises well above its recent average.
///
/// A tick is a beat iff the history is full and
/// - `energy > mean * threshold`,
/// - the history's deviation exceeds `variance_threshold` (flat or silent input never fires),
/// - at least `minimum_interval_ms` passed since the previous beat.
///
/// The decision is recomputed every tick; there is no held state besides the debounce timestamp.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    history: EnergyHistory,
    threshold: f32,
    variance_threshold: f32,
    minimum_interval_ms: f64,
    state: BeatState,
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(&BeatSettings::default())
    }
}

impl BeatDetector {
    pub fn new(settings: &BeatSettings) -> Self {
        Self {
            history: EnergyHistory::new(settings.history),
            threshold: settings.threshold,
            variance_threshold: settings.variance_threshold,
            minimum_interval_ms: settings.minimum_interval_ms,
            state: BeatState::default(),
        }
    }

    /// Feeds one energy sample taken at `now_ms` and returns this tick's state.
    pub fn update(&mut self, energy: f32, now_ms: f64) -> BeatState {
        self.history.push(energy);

        if !self.history.is_full() {
            self.state.is_beat = false;
            self.state.strength = 0.0;
            return self.state;
        }

        let mean = self.history.mean();
        let deviation = self.history.deviation(mean);

        let debounced = match self.state.last_beat_ms {
            Some(last) => now_ms - last >= self.minimum_interval_ms,
            None => true,
        };
        let is_beat =
            energy > mean * self.threshold && deviation > self.variance_threshold && debounced;

        if is_beat {
            self.state.last_beat_ms = Some(now_ms);
        }
        self.state.is_beat = is_beat;
        self.state.strength = if mean > 0.0 {
            ((energy - mean) / mean).max(0.0)
        } else {
            0.0
        };
        self.state
    }

    pub fn is_beat(&self) -> bool {
        self.state.is_beat
    }

    pub fn beat_strength(&self) -> f32 {
        self.state.strength
    }

    pub fn state(&self) -> BeatState {
        self.state
    }

    pub fn history(&self) -> &EnergyHistory {
        &self.history
    }

    /// Clears history and the debounce timestamp.
    pub fn reset(&mut self) {
        self.history.clear();
        self.state = BeatState::default();
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn variance_threshold(&self) -> f32 {
        self.variance_threshold
    }

    pub fn set_variance_threshold(&mut self, variance_threshold: f32) {
        self.variance_threshold = variance_threshold;
    }

    pub fn minimum_interval_ms(&self) -> f64 {
        self.minimum_interval_ms
    }

    pub fn set_minimum_interval_ms(&mut self, ms: f64) {
        self.minimum_interval_ms = ms.max(0.0);
    }
}
