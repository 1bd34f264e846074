//! GPU side of shadepulse on glow (OpenGL / GLES 3.0).
//!
//! The host owns context creation and the frame loop. This crate owns every GL object derived
//! from the context and releases them through explicit `destroy` calls, never `Drop`, because
//! releasing GL objects requires the context to still be current.
//!
//! Everything is written against the [`Gpu`] seam. [`GlowGpu`] drives a real context; with
//! the `headless` feature, `HeadlessGpu` runs the same pipeline in software.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod audio_textures;
pub mod feedback;
pub mod fps;
pub mod fullscreen;
pub mod glow_backend;
pub mod gpu;
#[cfg(any(test, feature = "headless"))]
pub mod headless;
pub mod pipeline;
pub mod program;
pub mod shaders;
pub mod target;
pub mod units;
pub mod visualizer;

pub use audio_textures::AudioTextures;
pub use feedback::FeedbackSurface;
pub use fps::FpsMeter;
pub use fullscreen::FullscreenSurface;
pub use glow_backend::GlowGpu;
pub use gpu::{ActiveVariable, GlslType, Gpu, ShaderStage, TextureFilter, TextureFormat};
#[cfg(any(test, feature = "headless"))]
pub use headless::{FragmentInput, HeadlessGpu};
pub use pipeline::{FrameInput, PipelineSettings, PresetPipeline};
pub use program::{compile_program, CompiledProgram};
pub use target::RenderTarget;
pub use visualizer::Visualizer;
