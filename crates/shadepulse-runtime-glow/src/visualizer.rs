//! Frame driver: audio features, beat detection and rendering, once per scheduler tick.

use std::panic::{catch_unwind, AssertUnwindSafe};

use shadepulse_audio::{BeatDetector, FeatureExtractor};
use shadepulse_core::{EngineConfig, EngineError};
use shadepulse_preset::hooks::panic_message;

use crate::fps::FpsMeter;
use crate::gpu::Gpu;
use crate::pipeline::{FrameInput, PipelineSettings, PresetPipeline};

/// Owns one feature extractor, one beat detector and one pipeline.
///
/// The host's scheduler calls [`Visualizer::tick`] once per display refresh. `start` and
/// `stop` only gate ticking; resources stay alive until [`Visualizer::destroy`].
#[derive(Debug)]
pub struct Visualizer<G: Gpu> {
    features: FeatureExtractor,
    beat: BeatDetector,
    pipeline: PresetPipeline<G>,
    running: bool,
    /// Scheduler time of the first tick; `u_time` counts from here.
    origin: Option<f64>,
    fps: FpsMeter,
}

impl<G: Gpu> Visualizer<G> {
    pub fn new(features: FeatureExtractor, beat: BeatDetector, pipeline: PresetPipeline<G>) -> Self {
        Self {
            features,
            beat,
            pipeline,
            running: false,
            origin: None,
            fps: FpsMeter::new(),
        }
    }

    /// Builds every part from one config. No audio source is connected yet.
    pub fn from_config(gpu: G, config: &EngineConfig) -> Result<Self, EngineError> {
        let pipeline = PresetPipeline::new(gpu, &PipelineSettings::from_config(config))?;
        Ok(Self::new(
            FeatureExtractor::new(&config.audio),
            BeatDetector::new(&config.beat),
            pipeline,
        ))
    }

    /// Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.fps.reset_window();
        tracing::info!("visualizer started");
        true
    }

    /// Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        tracing::info!("visualizer stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Runs one frame at scheduler time `now_secs` if running. Returns whether it did.
    ///
    /// A panic anywhere in the frame is caught and logged here so it never reaches the
    /// scheduler.
    pub fn tick(&mut self, now_secs: f64) -> bool {
        if !self.running {
            return false;
        }
        let origin = *self.origin.get_or_insert(now_secs);
        let time = (now_secs - origin) as f32;

        let result = catch_unwind(AssertUnwindSafe(|| self.frame(now_secs, time)));
        if let Err(payload) = result {
            tracing::error!(panic = %panic_message(payload.as_ref()), "frame aborted");
        }

        if let Some(fps) = self.fps.record(now_secs) {
            tracing::debug!(fps, "frame rate");
        }
        true
    }

    fn frame(&mut self, now_secs: f64, time: f32) {
        self.features.update();
        let beat = self.beat.update(self.features.energy(), now_secs * 1000.0);
        let audio = self.features.frame();
        self.pipeline.render(&FrameInput { audio: &audio, beat, time });
    }

    pub fn features(&self) -> &FeatureExtractor {
        &self.features
    }

    pub fn features_mut(&mut self) -> &mut FeatureExtractor {
        &mut self.features
    }

    pub fn beat_detector(&self) -> &BeatDetector {
        &self.beat
    }

    pub fn beat_detector_mut(&mut self) -> &mut BeatDetector {
        &mut self.beat
    }

    pub fn pipeline(&self) -> &PresetPipeline<G> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut PresetPipeline<G> {
        &mut self.pipeline
    }

    /// Rate of the last closed one-second window.
    pub fn fps(&self) -> Option<f32> {
        self.fps.fps()
    }

    /// Releases the pipeline and returns the context.
    pub fn destroy(mut self) -> G {
        self.stop();
        self.pipeline.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessGpu;
    use shadepulse_audio::AudioSource;
    use shadepulse_core::AudioSettings;
    use shadepulse_preset::Preset;

    const FRAG: &str = r#"#version 300 es
precision highp float;
uniform float u_energy;
uniform float u_beat;
out vec4 fragColor;
void main() {
    fragColor = vec4(u_energy, u_beat, 0.0, 1.0);
}
"#;

    struct Constant(u8);

    impl AudioSource for Constant {
        fn sample_rate(&self) -> f32 {
            44_100.0
        }

        fn fill_spectrum(&mut self, out: &mut [u8]) {
            out.fill(self.0);
        }

        fn fill_waveform(&mut self, out: &mut [u8]) {
            out.fill(128);
        }
    }

    fn small_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.audio = AudioSettings {
            fft_size: 64,
            ..AudioSettings::default()
        };
        config.render.width = 4;
        config.render.height = 4;
        config
    }

    fn visualizer() -> Visualizer<HeadlessGpu> {
        Visualizer::from_config(HeadlessGpu::new(4, 4), &small_config()).unwrap()
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut v = visualizer();
        assert!(!v.tick(0.0));
        assert!(v.start());
        assert!(!v.start());
        assert!(v.tick(0.0));
        assert!(v.stop());
        assert!(!v.stop());
        assert!(!v.tick(0.1));
        assert_eq!(v.pipeline().frame_count(), 1);

        // Stopping keeps every resource.
        assert!(v.pipeline().gpu().live_textures() > 0);
        assert!(v.start());
        assert!(v.tick(0.2));
        assert_eq!(v.pipeline().frame_count(), 2);
    }

    #[test]
    fn ticks_feed_audio_into_the_preset() {
        let mut v = visualizer();
        v.features_mut().connect(Constant(255));
        v.pipeline_mut()
            .load_preset(Preset::new("energy", "tests", FRAG))
            .unwrap();
        v.start();
        v.tick(1.0);

        let gpu = v.pipeline().gpu();
        let program = gpu
            .draws()
            .iter()
            .find_map(|d| d.framebuffer.and(d.program))
            .unwrap();
        assert_eq!(
            gpu.uniform_value(program, "u_energy"),
            Some(shadepulse_preset::UniformValue::Float(1.0))
        );
        // History is not full yet, so no beat.
        assert_eq!(
            gpu.uniform_value(program, "u_beat"),
            Some(shadepulse_preset::UniformValue::Float(0.0))
        );
    }

    #[test]
    fn panicking_frame_is_contained() {
        let mut v = visualizer();
        let preset = Preset::new("boom", "tests", FRAG).with_update(|_, _| panic!("boom"));
        v.pipeline_mut().load_preset(preset).unwrap();
        v.start();
        assert!(v.tick(0.0));
        assert!(v.tick(0.016));
        assert_eq!(v.pipeline().frame_count(), 2);
    }

    #[test]
    fn destroy_returns_clean_context() {
        let mut v = visualizer();
        v.start();
        v.tick(0.0);
        let gpu = v.destroy();
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.live_programs(), 0);
    }
}
