//! Advisory frame-rate telemetry.

/// Frames per second over rolling one-second windows.
#[derive(Debug, Clone, Default)]
pub struct FpsMeter {
    window_start: Option<f64>,
    frames: u32,
    last: Option<f32>,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame at `now` (seconds). Returns the rate when a window closes.
    pub fn record(&mut self, now: f64) -> Option<f32> {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };
        self.frames += 1;
        let elapsed = now - start;
        if elapsed < 1.0 {
            return None;
        }
        let fps = (self.frames as f64 / elapsed) as f32;
        self.window_start = Some(now);
        self.frames = 0;
        self.last = Some(fps);
        self.last
    }

    /// Rate of the last closed window.
    pub fn fps(&self) -> Option<f32> {
        self.last
    }

    /// Forgets the open window, e.g. after the loop was paused.
    pub fn reset_window(&mut self) {
        self.window_start = None;
        self.frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_second() {
        let mut m = FpsMeter::new();
        let mut reports = Vec::new();
        for i in 0..=120 {
            if let Some(fps) = m.record(i as f64 / 60.0) {
                reports.push(fps);
            }
        }
        assert_eq!(reports.len(), 2);
        assert!((reports[0] - 60.0).abs() < 0.5);
        assert_eq!(m.fps(), reports.last().copied());
    }

    #[test]
    fn first_frame_only_opens_the_window() {
        let mut m = FpsMeter::new();
        assert_eq!(m.record(5.0), None);
        assert_eq!(m.fps(), None);
    }
}
