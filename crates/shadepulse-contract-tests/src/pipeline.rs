#![forbid(unsafe_code)]

#[cfg(test)]
mod tests {
    use shadepulse_audio::{AudioFrame, BeatState};
    use shadepulse_core::{EngineConfig, EngineError};
    use shadepulse_preset::{Preset, UniformValue};
    use shadepulse_runtime_glow::{FrameInput, HeadlessGpu, PipelineSettings, PresetPipeline};

    const PRESET_FULL_JSON: &str = include_str!("../fixtures/preset_full.json");
    const PRESET_MINIMAL_JSON: &str = include_str!("../fixtures/preset_minimal.json");
    const PRESET_BROKEN_SHADER_JSON: &str =
        include_str!("../fixtures/preset_broken_shader.json");

    fn pipeline() -> PresetPipeline<HeadlessGpu> {
        let mut cfg = EngineConfig::default();
        cfg.render.width = 8;
        cfg.render.height = 8;
        PresetPipeline::new(HeadlessGpu::new(8, 8), &PipelineSettings::from_config(&cfg))
            .expect("headless pipeline")
    }

    /// Every uniform a fixture declares must reach the compiled program.
    #[test]
    fn full_fixture_binds_every_declared_uniform() {
        let mut p = pipeline();
        let preset = Preset::from_json_str(PRESET_FULL_JSON).expect("parse");
        p.load_preset(preset).expect("full preset compiles");

        let spectrum = vec![200u8; 1024];
        let waveform = vec![128u8; 2048];
        let audio = AudioFrame {
            spectrum: &spectrum,
            waveform: &waveform,
            energy: 0.5,
            bass: 0.5,
            treble: 0.5,
        };
        p.render(&FrameInput {
            audio: &audio,
            beat: BeatState::default(),
            time: 0.0,
        });

        let gpu = p.gpu();
        let program = gpu
            .draws()
            .iter()
            .find_map(|d| d.framebuffer.and(d.program))
            .expect("preset draw");
        assert_eq!(
            gpu.uniform_value(program, "u_decay"),
            Some(UniformValue::Float(0.92))
        );
        assert_eq!(
            gpu.uniform_value(program, "u_bands"),
            Some(UniformValue::Int(32))
        );
        assert_eq!(
            gpu.uniform_value(program, "u_mirror"),
            Some(UniformValue::Bool(false))
        );
        assert_eq!(
            gpu.uniform_value(program, "u_tint"),
            Some(UniformValue::Vec3([0.2, 0.8, 1.0]))
        );
        assert_eq!(
            gpu.uniform_value(program, "u_previousFrame"),
            Some(UniformValue::Sampler(0))
        );
        assert_eq!(
            gpu.uniform_value(program, "u_spectrum"),
            Some(UniformValue::Sampler(1))
        );
        assert!(gpu.errors().is_empty(), "{:?}", gpu.errors());
    }

    #[test]
    fn broken_fixture_fails_with_shader_log_and_leaves_pipeline_idle() {
        let mut p = pipeline();
        p.load_preset(Preset::from_json_str(PRESET_MINIMAL_JSON).expect("parse"))
            .expect("minimal preset compiles");

        let broken = Preset::from_json_str(PRESET_BROKEN_SHADER_JSON).expect("parse");
        let err = p.load_preset(broken).expect_err("broken shader must fail");
        assert!(
            matches!(err, EngineError::FragmentCompile(ref log) if log.contains("#error")),
            "expected fragment compile error, got: {err}"
        );
        assert!(!p.has_active_preset());
        assert_eq!(p.active_preset_name(), None);
    }
}
