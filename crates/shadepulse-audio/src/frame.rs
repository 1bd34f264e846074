/// One frame's worth of audio features.
///
/// The byte buffers borrow the extractor's reused storage, so a frame cannot outlive the next
/// `FeatureExtractor::update`. Copy the slices if you need to keep them.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    /// Magnitude per frequency bin, 0..=255.
    pub spectrum: &'a [u8],
    /// Time-domain samples, 0..=255 centered at 128.
    pub waveform: &'a [u8],
    pub energy: f32,
    pub bass: f32,
    pub treble: f32,
}

impl AudioFrame<'static> {
    /// A frame with no data and all features at zero.
    pub fn silent() -> Self {
        Self {
            spectrum: &[],
            waveform: &[],
            energy: 0.0,
            bass: 0.0,
            treble: 0.0,
        }
    }
}
