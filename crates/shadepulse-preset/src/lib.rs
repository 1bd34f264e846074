//! Preset vocabulary: what a visual effect declares (shaders, uniforms, metadata) and the
//! optional lifecycle hooks it may attach in code.
//!
//! This crate is backend-agnostic: no GL handles, no windowing.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod builtins;
pub mod error;
pub mod hooks;
pub mod model;
pub mod uniform;

pub use error::PresetError;
pub use hooks::{HookError, PresetHooks, UpdateContext};
pub use model::{Preset, PresetMetadata, PresetShaders};
pub use uniform::{PresetUniforms, RawValue, UniformSpec, UniformType, UniformValue};
