//! Texture unit contract shared by every preset.
//!
//! A preset's `u_previousFrame`, `u_spectrum` and `u_waveform` samplers always read these
//! units. Changing a value breaks existing presets.

pub const PREVIOUS_FRAME_UNIT: u32 = 0;
pub const SPECTRUM_UNIT: u32 = 1;
pub const WAVEFORM_UNIT: u32 = 2;
