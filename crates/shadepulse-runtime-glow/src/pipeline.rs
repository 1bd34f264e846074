//! One preset, one frame: audio textures, update hook, uniforms, draw, composite, swap.

use shadepulse_audio::{AudioFrame, BeatState};
use shadepulse_core::{EngineConfig, EngineError};
use shadepulse_preset::builtins::{
    A_POSITION, U_BASS, U_BEAT, U_BEAT_STRENGTH, U_ENERGY, U_FRAME, U_PREVIOUS_FRAME,
    U_RESOLUTION, U_SPECTRUM, U_TIME, U_TREBLE, U_WAVEFORM,
};
use shadepulse_preset::{Preset, PresetUniforms, UniformValue, UpdateContext};

use crate::audio_textures::AudioTextures;
use crate::feedback::FeedbackSurface;
use crate::fullscreen::FullscreenSurface;
use crate::gpu::{GlslType, Gpu};
use crate::program::CompiledProgram;
use crate::shaders::{COPY_FRAGMENT, COPY_SOURCE_UNIFORM, DEFAULT_VERTEX};
use crate::units::{PREVIOUS_FRAME_UNIT, SPECTRUM_UNIT, WAVEFORM_UNIT};

/// Sizes and colors fixed at pipeline construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub width: i32,
    pub height: i32,
    pub spectrum_len: usize,
    pub waveform_len: usize,
    /// Display color while no preset is active.
    pub clear_color: [f32; 4],
}

impl PipelineSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            width: config.render.width,
            height: config.render.height,
            spectrum_len: config.audio.spectrum_len(),
            waveform_len: config.audio.waveform_len(),
            clear_color: config.render.clear_color,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Per-frame inputs.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub audio: &'a AudioFrame<'a>,
    pub beat: BeatState,
    /// Seconds, monotonic. Uploaded as `u_time`.
    pub time: f32,
}

#[derive(Debug)]
struct ActivePreset<G: Gpu> {
    preset: Preset,
    program: CompiledProgram<G>,
    uniforms: PresetUniforms,
    /// Frame time of the first render after loading.
    loaded_at: Option<f32>,
}

/// Preset-independent GPU objects, created together or not at all.
struct SharedResources<G: Gpu> {
    audio_textures: AudioTextures<G>,
    feedback: FeedbackSurface<G>,
    copy_program: CompiledProgram<G>,
    copy_slot: u32,
    fullscreen: FullscreenSurface<G>,
}

impl<G: Gpu> SharedResources<G> {
    fn create(gpu: &G, settings: &PipelineSettings) -> Result<Self, EngineError> {
        let (w, h) = (settings.width.max(1), settings.height.max(1));

        let audio_textures =
            AudioTextures::new(gpu, settings.spectrum_len, settings.waveform_len)?;
        let feedback = match FeedbackSurface::new(gpu, w, h) {
            Ok(f) => f,
            Err(e) => {
                audio_textures.destroy(gpu);
                return Err(e);
            }
        };
        let copy_program = match CompiledProgram::compile(gpu, DEFAULT_VERTEX, COPY_FRAGMENT) {
            Ok(p) => p,
            Err(e) => {
                feedback.destroy(gpu);
                audio_textures.destroy(gpu);
                return Err(e);
            }
        };
        let copy_slot = copy_program.attribute(A_POSITION).unwrap_or(0);
        let fullscreen = match FullscreenSurface::new(gpu, copy_slot) {
            Ok(m) => m,
            Err(e) => {
                copy_program.destroy(gpu);
                feedback.destroy(gpu);
                audio_textures.destroy(gpu);
                return Err(e);
            }
        };

        Ok(Self {
            audio_textures,
            feedback,
            copy_program,
            copy_slot,
            fullscreen,
        })
    }
}

/// Owns the GPU context and everything derived from it.
///
/// At most one preset is active. Without one, `render` clears the display to the clear color.
#[derive(Debug)]
pub struct PresetPipeline<G: Gpu> {
    gpu: G,
    audio_textures: AudioTextures<G>,
    feedback: FeedbackSurface<G>,
    fullscreen: FullscreenSurface<G>,
    copy_program: CompiledProgram<G>,
    copy_slot: u32,
    active: Option<ActivePreset<G>>,
    display: (i32, i32),
    clear_color: [f32; 4],
    frame: u64,
}

impl<G: Gpu> PresetPipeline<G> {
    /// Creates every shared resource. On error nothing created here is left alive.
    pub fn new(gpu: G, settings: &PipelineSettings) -> Result<Self, EngineError> {
        Self::try_new(gpu, settings).map_err(|(_, e)| e)
    }

    /// Like [`PresetPipeline::new`], but hands the context back on failure so the caller
    /// can retry with it.
    pub fn try_new(gpu: G, settings: &PipelineSettings) -> Result<Self, (G, EngineError)> {
        let shared = match SharedResources::create(&gpu, settings) {
            Ok(shared) => shared,
            Err(e) => return Err((gpu, e)),
        };
        let (w, h) = shared.feedback.size();
        tracing::info!(width = w, height = h, "preset pipeline ready");
        Ok(Self {
            gpu,
            audio_textures: shared.audio_textures,
            feedback: shared.feedback,
            fullscreen: shared.fullscreen,
            copy_program: shared.copy_program,
            copy_slot: shared.copy_slot,
            active: None,
            display: (w, h),
            clear_color: settings.clear_color,
            frame: 0,
        })
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn has_active_preset(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_preset_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.preset.name())
    }

    pub fn feedback(&self) -> &FeedbackSurface<G> {
        &self.feedback
    }

    pub fn audio_textures(&self) -> &AudioTextures<G> {
        &self.audio_textures
    }

    pub fn display_size(&self) -> (i32, i32) {
        self.display
    }

    /// Replaces the active preset.
    ///
    /// The old preset is torn down first (destroy hook, then program) and the feedback
    /// surface is cleared. If the new preset fails validation or compilation the pipeline is
    /// left idle and the error is returned.
    pub fn load_preset(&mut self, preset: Preset) -> Result<(), EngineError> {
        self.unload_preset();
        self.feedback.clear(&self.gpu, [0.0, 0.0, 0.0, 0.0]);

        let name = preset.name().to_string();
        match self.activate(preset) {
            Ok(active) => {
                tracing::info!(
                    preset = %name,
                    uniforms = active.uniforms.len(),
                    "preset loaded"
                );
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                tracing::error!(preset = %name, error = %e, "preset load failed; pipeline idle");
                Err(e)
            }
        }
    }

    fn activate(&self, mut preset: Preset) -> Result<ActivePreset<G>, EngineError> {
        preset.validate()?;
        let mut uniforms = PresetUniforms::from_specs(&preset.uniforms)?;
        let vertex = preset.shaders.vertex.as_deref().unwrap_or(DEFAULT_VERTEX);
        let program = CompiledProgram::compile(&self.gpu, vertex, &preset.shaders.fragment)?;

        if let Err(e) = preset.hooks.run_init(&mut uniforms) {
            tracing::warn!(preset = preset.name(), error = %e, "init hook failed");
        }

        Ok(ActivePreset {
            preset,
            program,
            uniforms,
            loaded_at: None,
        })
    }

    /// Runs the active preset's destroy hook and releases its program.
    ///
    /// Returns the preset definition, without hooks that already ran.
    pub fn unload_preset(&mut self) -> Option<Preset> {
        let mut active = self.active.take()?;
        if let Err(e) = active.preset.hooks.run_destroy() {
            tracing::warn!(preset = active.preset.name(), error = %e, "destroy hook failed");
        }
        active.program.destroy(&self.gpu);
        tracing::info!(preset = active.preset.name(), "preset unloaded");
        Some(active.preset)
    }

    /// Live value of a declared preset uniform (by declared name, without `u_`).
    pub fn preset_uniform(&self, name: &str) -> Option<UniformValue> {
        self.active.as_ref()?.uniforms.get(name)
    }

    /// Sets a declared preset uniform, clamped to its declared range.
    ///
    /// Float scalars are converted to the declared int/bool type. NaN and infinite values are
    /// refused. Returns whether the value was accepted.
    pub fn set_preset_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        let Some(active) = self.active.as_mut() else {
            tracing::debug!(uniform = name, "no active preset; uniform ignored");
            return false;
        };
        if !value.is_finite() {
            tracing::debug!(uniform = name, "non-finite uniform value rejected");
            return false;
        }
        let value = match (active.uniforms.get(name), value) {
            (Some(UniformValue::Int(_)), UniformValue::Float(x)) => UniformValue::Int(x.round() as i32),
            (Some(UniformValue::Bool(_)), UniformValue::Float(x)) => UniformValue::Bool(x != 0.0),
            (_, v) => v,
        };
        match active.uniforms.set(name, value) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(uniform = name, error = %e, "preset uniform rejected");
                false
            }
        }
    }

    /// Resizes the display and the feedback surface.
    pub fn resize(&mut self, width: i32, height: i32) {
        let (w, h) = (width.max(1), height.max(1));
        self.display = (w, h);
        if self.feedback.resize(&self.gpu, w, h) {
            tracing::info!(width = w, height = h, "feedback surface resized");
        }
    }

    /// Renders one frame.
    pub fn render(&mut self, input: &FrameInput<'_>) {
        let gpu = &self.gpu;

        self.audio_textures
            .upload(gpu, input.audio.spectrum, input.audio.waveform);

        let Some(active) = self.active.as_mut() else {
            gpu.bind_framebuffer(None);
            gpu.viewport(0, 0, self.display.0, self.display.1);
            gpu.clear(self.clear_color);
            self.frame += 1;
            return;
        };

        let loaded_at = *active.loaded_at.get_or_insert(input.time);
        let ctx = UpdateContext {
            audio: input.audio,
            beat: input.beat,
            elapsed: input.time - loaded_at,
            frame: self.frame,
        };
        if let Err(e) = active.preset.hooks.run_update(&ctx, &mut active.uniforms) {
            tracing::warn!(preset = active.preset.name(), error = %e, "update hook failed");
        }

        self.feedback.bind(gpu);
        let program = &mut active.program;
        gpu.use_program(Some(program.handle()));

        let (w, h) = self.feedback.size();
        let audio = input.audio;
        let scalars = [
            (U_TIME, input.time),
            (U_ENERGY, audio.energy),
            (U_BASS, audio.bass),
            (U_TREBLE, audio.treble),
            (U_BEAT, if input.beat.is_beat { 1.0 } else { 0.0 }),
            (U_BEAT_STRENGTH, input.beat.strength),
        ];
        for (name, x) in scalars {
            if program.has_uniform(name) {
                program.set_scalar(gpu, name, x);
            }
        }
        match program.uniform_type(U_FRAME) {
            // Wraps instead of losing precision through f32.
            Some(GlslType::Int) => {
                program.set_uniform(gpu, U_FRAME, &UniformValue::Int(self.frame as i32));
            }
            Some(_) => {
                program.set_scalar(gpu, U_FRAME, self.frame as f32);
            }
            None => {}
        }
        if program.has_uniform(U_RESOLUTION) {
            program.set_uniform(gpu, U_RESOLUTION, &UniformValue::Vec2([w as f32, h as f32]));
        }

        for (_, exposed, value) in active.uniforms.iter() {
            if program.has_uniform(exposed) {
                program.set_uniform(gpu, exposed, &value);
            }
        }

        let bindings = [
            (U_PREVIOUS_FRAME, PREVIOUS_FRAME_UNIT, self.feedback.previous_texture()),
            (U_SPECTRUM, SPECTRUM_UNIT, self.audio_textures.spectrum_texture()),
            (U_WAVEFORM, WAVEFORM_UNIT, self.audio_textures.waveform_texture()),
        ];
        for (name, unit, tex) in bindings {
            gpu.bind_texture_unit(unit, Some(tex));
            if program.has_uniform(name) {
                program.set_uniform(gpu, name, &UniformValue::Sampler(unit));
            }
        }

        let slot = program.attribute(A_POSITION).unwrap_or(self.copy_slot);
        self.fullscreen.set_position_slot(gpu, slot);
        self.fullscreen.draw(gpu);

        for unit in [PREVIOUS_FRAME_UNIT, SPECTRUM_UNIT, WAVEFORM_UNIT] {
            gpu.bind_texture_unit(unit, None);
        }

        // Composite onto the display.
        gpu.bind_framebuffer(None);
        gpu.viewport(0, 0, self.display.0, self.display.1);
        gpu.use_program(Some(self.copy_program.handle()));
        gpu.bind_texture_unit(0, Some(self.feedback.current_texture()));
        self.copy_program
            .set_uniform(gpu, COPY_SOURCE_UNIFORM, &UniformValue::Sampler(0));
        self.fullscreen.set_position_slot(gpu, self.copy_slot);
        self.fullscreen.draw(gpu);
        gpu.bind_texture_unit(0, None);
        gpu.use_program(None);

        self.feedback.swap();
        self.frame += 1;
    }

    /// RGBA8 pixels of the most recently completed frame, bottom row first.
    pub fn read_last_frame(&self) -> Vec<u8> {
        let target = self.feedback.previous_target();
        let mut out = vec![0u8; (target.w * target.h * 4) as usize];
        self.gpu.bind_framebuffer(Some(target.fbo));
        self.gpu.read_pixels(0, 0, target.w, target.h, &mut out);
        self.gpu.bind_framebuffer(None);
        out
    }

    /// Releases the preset, its program, the surfaces and the audio textures, in that order,
    /// and hands the context back.
    pub fn destroy(mut self) -> G {
        self.unload_preset();
        let Self {
            gpu,
            audio_textures,
            feedback,
            fullscreen,
            copy_program,
            ..
        } = self;
        copy_program.destroy(&gpu);
        fullscreen.destroy(&gpu);
        feedback.destroy(&gpu);
        audio_textures.destroy(&gpu);
        gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessGpu;
    use shadepulse_preset::{HookError, RawValue, UniformSpec, UniformType};
    use std::cell::Cell;
    use std::rc::Rc;

    const SPECTRUM_FRAG: &str = r#"#version 300 es
precision highp float;
in vec2 v_uv;
uniform sampler2D u_spectrum;
out vec4 fragColor;
void main() {
    fragColor = vec4(texture(u_spectrum, v_uv).r, 0.0, 0.0, 1.0);
}
"#;

    const BUILTINS_FRAG: &str = r#"#version 300 es
precision highp float;
uniform float u_time;
uniform vec2 u_resolution;
uniform float u_beat;
uniform int u_frame;
uniform float u_gain;
out vec4 fragColor;
void main() {
    fragColor = vec4(u_time, u_resolution.x, u_beat * u_gain, float(u_frame));
}
"#;

    const TRAILS_FRAG: &str = r#"#version 300 es
precision highp float;
in vec2 v_uv;
uniform sampler2D u_previousFrame;
uniform float u_energy;
out vec4 fragColor;
void main() {
    fragColor = texture(u_previousFrame, v_uv) * 0.5 + vec4(u_energy);
}
"#;

    fn settings(w: i32, h: i32) -> PipelineSettings {
        PipelineSettings {
            width: w,
            height: h,
            spectrum_len: 16,
            waveform_len: 32,
            clear_color: [0.0, 0.0, 1.0, 1.0],
        }
    }

    fn frame<'a>(audio: &'a AudioFrame<'a>, time: f32) -> FrameInput<'a> {
        FrameInput {
            audio,
            beat: BeatState::default(),
            time,
        }
    }

    fn preset_draw(gpu: &HeadlessGpu) -> crate::headless::DrawCall {
        gpu.draws()
            .into_iter()
            .filter(|d| d.framebuffer.is_some())
            .last()
            .unwrap()
    }

    #[test]
    fn full_spectrum_reaches_the_feedback_target() {
        let gpu = HeadlessGpu::new(4, 4);
        gpu.register_kernel(SPECTRUM_FRAG, |f| {
            [f.sample(f.sampler("u_spectrum"), f.uv())[0], 0.0, 0.0, 1.0]
        });
        let mut pipeline = PresetPipeline::new(gpu, &settings(4, 4)).unwrap();
        pipeline
            .load_preset(Preset::new("spectrum", "tests", SPECTRUM_FRAG))
            .unwrap();

        let spectrum = [255u8; 16];
        let waveform = [128u8; 32];
        let audio = AudioFrame {
            spectrum: &spectrum,
            waveform: &waveform,
            energy: 1.0,
            bass: 1.0,
            treble: 1.0,
        };
        pipeline.render(&frame(&audio, 0.0));

        let spectrum_tex = pipeline.audio_textures().spectrum_texture();
        let gpu = pipeline.gpu();
        let draw = preset_draw(gpu);
        assert_eq!((draw.first, draw.count), (0, 6));
        assert_eq!(draw.units.get(&SPECTRUM_UNIT), Some(&spectrum_tex));
        assert_eq!(gpu.texture_data(spectrum_tex).unwrap(), vec![255; 16]);
        assert_eq!(
            gpu.uniform_value(draw.program.unwrap(), U_SPECTRUM),
            Some(UniformValue::Sampler(SPECTRUM_UNIT))
        );

        let pixels = pipeline.read_last_frame();
        assert_eq!(pixels.len(), 4 * 4 * 4);
        assert!(pixels.chunks(4).all(|p| p[0] >= 254));
        assert!(pipeline.gpu().display_pixels().chunks(4).all(|p| p[0] >= 254));
        assert!(pipeline.gpu().errors().is_empty());
        assert_eq!(pipeline.frame_count(), 1);
    }

    #[test]
    fn builtins_and_preset_uniforms_are_uploaded() {
        let gpu = HeadlessGpu::new(8, 4);
        let mut pipeline = PresetPipeline::new(gpu, &settings(8, 4)).unwrap();
        let preset = Preset::new("builtins", "tests", BUILTINS_FRAG).with_uniform(
            "gain",
            UniformSpec::new(UniformType::Float, RawValue::Number(0.5)).with_range(0.0, 1.0),
        );
        pipeline.load_preset(preset).unwrap();
        assert!(pipeline.set_preset_uniform("gain", UniformValue::Float(3.0)));
        assert_eq!(pipeline.preset_uniform("gain"), Some(UniformValue::Float(1.0)));
        assert!(!pipeline.set_preset_uniform("missing", UniformValue::Float(1.0)));

        let audio = AudioFrame::silent();
        let beat = BeatState {
            is_beat: true,
            strength: 0.5,
            last_beat_ms: Some(0.0),
        };
        pipeline.render(&FrameInput {
            audio: &audio,
            beat,
            time: 2.5,
        });
        pipeline.render(&frame(&audio, 2.6));

        let gpu = pipeline.gpu();
        let program = preset_draw(gpu).program.unwrap();
        assert_eq!(gpu.uniform_value(program, U_TIME), Some(UniformValue::Float(2.6)));
        assert_eq!(gpu.uniform_value(program, U_FRAME), Some(UniformValue::Int(1)));
        assert_eq!(gpu.uniform_value(program, U_BEAT), Some(UniformValue::Float(0.0)));
        assert_eq!(
            gpu.uniform_value(program, U_RESOLUTION),
            Some(UniformValue::Vec2([8.0, 4.0]))
        );
        assert_eq!(gpu.uniform_value(program, "u_gain"), Some(UniformValue::Float(1.0)));
        // Not referenced by this shader.
        assert_eq!(gpu.uniform_value(program, U_ENERGY), None);
        assert!(gpu.errors().is_empty());
    }

    #[test]
    fn previous_frame_feeds_back_on_unit_zero() {
        let gpu = HeadlessGpu::new(2, 2);
        gpu.register_kernel(TRAILS_FRAG, |f| {
            let prev = f.sample(f.sampler("u_previousFrame"), f.uv());
            let e = f.float("u_energy");
            [prev[0] * 0.5 + e, 0.0, 0.0, 1.0]
        });
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();
        pipeline
            .load_preset(Preset::new("trails", "tests", TRAILS_FRAG))
            .unwrap();

        let loud = AudioFrame {
            energy: 1.0,
            ..AudioFrame::silent()
        };
        pipeline.render(&frame(&loud, 0.0));
        let written = pipeline.feedback().previous_texture();
        pipeline.render(&frame(&AudioFrame::silent(), 0.1));

        let draw = preset_draw(pipeline.gpu());
        assert_eq!(draw.units.get(&PREVIOUS_FRAME_UNIT), Some(&written));
        let pixels = pipeline.read_last_frame();
        assert!(pixels.chunks(4).all(|p| (127..=128).contains(&p[0])));
    }

    #[test]
    fn failed_load_leaves_pipeline_idle() {
        let gpu = HeadlessGpu::new(2, 2);
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();

        let destroyed = Rc::new(Cell::new(false));
        let flag = destroyed.clone();
        let good = Preset::new("good", "tests", SPECTRUM_FRAG).with_destroy(move || {
            flag.set(true);
            Ok(())
        });
        pipeline.load_preset(good).unwrap();

        let err = pipeline
            .load_preset(Preset::new("bad", "tests", "#error nope\nvoid main() {}"))
            .unwrap_err();
        assert!(err.is_shader_error());
        assert!(destroyed.get());
        assert!(!pipeline.has_active_preset());
        // Only the composite program remains.
        assert_eq!(pipeline.gpu().live_programs(), 1);
        assert_eq!(pipeline.gpu().live_shaders(), 0);

        pipeline.render(&frame(&AudioFrame::silent(), 0.0));
        assert!(pipeline
            .gpu()
            .display_pixels()
            .chunks(4)
            .all(|p| p == [0, 0, 255, 255]));
    }

    #[test]
    fn invalid_preset_is_rejected_before_compilation() {
        let gpu = HeadlessGpu::new(2, 2);
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();
        let preset = Preset::new("clash", "tests", BUILTINS_FRAG).with_uniform(
            "time",
            UniformSpec::new(UniformType::Float, RawValue::Number(0.0)),
        );
        let err = pipeline.load_preset(preset).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPreset(_)));
        assert_eq!(pipeline.gpu().live_programs(), 1);
    }

    #[test]
    fn failing_hooks_do_not_stop_rendering() {
        let gpu = HeadlessGpu::new(2, 2);
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();
        let preset = Preset::new("flaky", "tests", SPECTRUM_FRAG)
            .with_init(|_| Err(HookError::msg("init broke")))
            .with_update(|ctx, _| {
                if ctx.frame == 0 {
                    panic!("update exploded");
                }
                Err(HookError::msg("still broken"))
            });
        pipeline.load_preset(preset).unwrap();
        assert!(pipeline.has_active_preset());

        pipeline.render(&frame(&AudioFrame::silent(), 0.0));
        pipeline.render(&frame(&AudioFrame::silent(), 0.1));
        assert_eq!(pipeline.frame_count(), 2);
        assert_eq!(
            pipeline
                .gpu()
                .draws()
                .iter()
                .filter(|d| d.framebuffer.is_some())
                .count(),
            2
        );
    }

    #[test]
    fn update_hook_sees_elapsed_since_load() {
        let gpu = HeadlessGpu::new(2, 2);
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();
        let seen = Rc::new(Cell::new(-1.0f32));
        let sink = seen.clone();
        let preset = Preset::new("clock", "tests", BUILTINS_FRAG)
            .with_uniform("gain", UniformSpec::new(UniformType::Float, RawValue::Number(0.0)))
            .with_update(move |ctx, uniforms| {
                sink.set(ctx.elapsed);
                uniforms
                    .set("gain", UniformValue::Float(ctx.elapsed))
                    .map(|_| ())
                    .map_err(|e| HookError::msg(e.to_string()))
            });
        pipeline.load_preset(preset).unwrap();

        pipeline.render(&frame(&AudioFrame::silent(), 10.0));
        pipeline.render(&frame(&AudioFrame::silent(), 10.5));
        assert!((seen.get() - 0.5).abs() < 1e-6);
        assert_eq!(pipeline.preset_uniform("gain"), Some(UniformValue::Float(0.5)));
    }

    #[test]
    fn update_hook_output_reaches_the_same_frame() {
        let gpu = HeadlessGpu::new(2, 2);
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();
        let preset = Preset::new("ordered", "tests", BUILTINS_FRAG)
            .with_uniform("gain", UniformSpec::new(UniformType::Float, RawValue::Number(0.0)))
            .with_update(|ctx, uniforms| {
                uniforms
                    .set("gain", UniformValue::Float(ctx.frame as f32 + 1.0))
                    .map(|_| ())
                    .map_err(|e| HookError::msg(e.to_string()))
            });
        pipeline.load_preset(preset).unwrap();

        for n in 0..3u64 {
            pipeline.render(&frame(&AudioFrame::silent(), n as f32 * 0.1));
            let gpu = pipeline.gpu();
            let program = preset_draw(gpu).program.unwrap();
            assert_eq!(
                gpu.uniform_value(program, "u_gain"),
                Some(UniformValue::Float(n as f32 + 1.0)),
                "frame {n}"
            );
        }

        // Each frame: preset pass into the feedback target, then the composite onto the display.
        let draws = pipeline.gpu().draws();
        assert_eq!(draws.len(), 6);
        for pair in draws.chunks(2) {
            assert!(pair[0].framebuffer.is_some());
            assert!(pair[1].framebuffer.is_none());
            assert_ne!(pair[0].program, pair[1].program);
        }
    }

    #[test]
    fn non_finite_control_values_never_reach_the_shader() {
        let gpu = HeadlessGpu::new(2, 2);
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();
        let preset = Preset::new("guarded", "tests", BUILTINS_FRAG)
            .with_uniform("gain", UniformSpec::new(UniformType::Float, RawValue::Number(0.25)))
            .with_uniform("steps", UniformSpec::new(UniformType::Int, RawValue::Number(3.0)));
        pipeline.load_preset(preset).unwrap();

        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(!pipeline.set_preset_uniform("gain", UniformValue::Float(bad)));
            assert!(!pipeline.set_preset_uniform("steps", UniformValue::Float(bad)));
        }
        assert_eq!(pipeline.preset_uniform("gain"), Some(UniformValue::Float(0.25)));
        assert_eq!(pipeline.preset_uniform("steps"), Some(UniformValue::Int(3)));

        pipeline.render(&frame(&AudioFrame::silent(), 0.0));
        let gpu = pipeline.gpu();
        let program = preset_draw(gpu).program.unwrap();
        assert_eq!(gpu.uniform_value(program, "u_gain"), Some(UniformValue::Float(0.25)));
    }

    #[test]
    fn int_frame_counter_stays_exact_past_f32_precision() {
        let gpu = HeadlessGpu::new(2, 2);
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();
        pipeline
            .load_preset(Preset::new("long-run", "tests", BUILTINS_FRAG))
            .unwrap();
        let start = (1u64 << 24) + 1;
        pipeline.frame = start;

        pipeline.render(&frame(&AudioFrame::silent(), 0.0));
        pipeline.render(&frame(&AudioFrame::silent(), 0.1));

        let gpu = pipeline.gpu();
        let program = preset_draw(gpu).program.unwrap();
        assert_eq!(
            gpu.uniform_value(program, U_FRAME),
            Some(UniformValue::Int((start + 1) as i32))
        );
    }

    #[test]
    fn resize_forwards_to_feedback() {
        let gpu = HeadlessGpu::new(2, 2);
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();
        let allocations = pipeline.gpu().texture_allocations();
        pipeline.resize(2, 2);
        assert_eq!(pipeline.gpu().texture_allocations(), allocations);
        pipeline.resize(6, 3);
        assert_eq!(pipeline.feedback().size(), (6, 3));
        assert_eq!(pipeline.display_size(), (6, 3));
    }

    #[test]
    fn destroy_releases_everything_in_order() {
        let gpu = HeadlessGpu::new(2, 2);
        let mut pipeline = PresetPipeline::new(gpu, &settings(2, 2)).unwrap();
        let destroyed = Rc::new(Cell::new(false));
        let flag = destroyed.clone();
        pipeline
            .load_preset(
                Preset::new("bye", "tests", SPECTRUM_FRAG).with_destroy(move || {
                    flag.set(true);
                    Ok(())
                }),
            )
            .unwrap();
        pipeline.render(&frame(&AudioFrame::silent(), 0.0));

        let gpu = pipeline.destroy();
        assert!(destroyed.get());
        assert_eq!(gpu.live_programs(), 0);
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.live_framebuffers(), 0);
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.live_vertex_arrays(), 0);
        assert!(gpu.errors().is_empty());
    }

    #[test]
    fn construction_failure_is_reported() {
        let gpu = HeadlessGpu::new(2, 2);
        gpu.fail_framebuffer_creation(true);
        let err = PresetPipeline::new(gpu, &settings(2, 2)).unwrap_err();
        assert!(matches!(err, EngineError::GlCreate(_)));
    }

    #[test]
    fn failed_construction_returns_the_context_for_a_retry() {
        let gpu = HeadlessGpu::new(2, 2);
        gpu.fail_framebuffer_creation(true);
        let (gpu, err) = match PresetPipeline::try_new(gpu, &settings(2, 2)) {
            Ok(_) => panic!("construction should fail"),
            Err(returned) => returned,
        };
        assert!(matches!(err, EngineError::GlCreate(_)));
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.live_framebuffers(), 0);

        gpu.fail_framebuffer_creation(false);
        let pipeline = PresetPipeline::try_new(gpu, &settings(2, 2))
            .map_err(|(_, e)| e)
            .unwrap();
        assert!(pipeline.gpu().errors().is_empty());
    }
}
