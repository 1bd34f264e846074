//! Audio side of shadepulse: per-frame feature extraction and beat detection.
//!
//! Everything here runs on the render thread once per frame. The only cross-thread state is
//! [`SampleRing`], written by an audio device callback and read when a frame pulls features.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod analyser;
pub mod beat;
#[cfg(feature = "capture")]
pub mod capture;
pub mod features;
pub mod frame;
pub mod source;

pub use analyser::Analyser;
pub use beat::{BeatDetector, BeatState, EnergyHistory};
#[cfg(feature = "capture")]
pub use capture::CaptureSource;
pub use features::{BandLayout, FeatureExtractor};
pub use frame::AudioFrame;
pub use source::{AudioSource, SampleRing, StreamSource};
