//! Shared vocabulary for the shadepulse crates: the engine error taxonomy and
//! the JSON configuration layer.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod config;
pub mod error;

pub use error::EngineError;

pub use config::{
    load_engine_config_from, load_typed_json, AudioSettings, BandSettings, BeatSettings,
    EngineConfig, RenderSettings,
};
