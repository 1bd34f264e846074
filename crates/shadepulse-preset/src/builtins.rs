//! Names every preset shader can rely on.
//!
//! Adding a name is additive; renaming or removing one breaks presets.

pub const U_TIME: &str = "u_time";
pub const U_FRAME: &str = "u_frame";
pub const U_RESOLUTION: &str = "u_resolution";
pub const U_ENERGY: &str = "u_energy";
pub const U_BASS: &str = "u_bass";
pub const U_TREBLE: &str = "u_treble";
pub const U_BEAT: &str = "u_beat";
pub const U_BEAT_STRENGTH: &str = "u_beatStrength";
pub const U_PREVIOUS_FRAME: &str = "u_previousFrame";
pub const U_SPECTRUM: &str = "u_spectrum";
pub const U_WAVEFORM: &str = "u_waveform";

pub const BUILTIN_UNIFORMS: [&str; 11] = [
    U_TIME,
    U_FRAME,
    U_RESOLUTION,
    U_ENERGY,
    U_BASS,
    U_TREBLE,
    U_BEAT,
    U_BEAT_STRENGTH,
    U_PREVIOUS_FRAME,
    U_SPECTRUM,
    U_WAVEFORM,
];

/// Namespace marker for preset-declared uniforms.
pub const PRESET_UNIFORM_PREFIX: &str = "u_";

/// Vertex attribute the fullscreen mesh feeds.
pub const A_POSITION: &str = "a_position";

/// Shader-side name for a preset-declared uniform.
pub fn exposed_name(name: &str) -> String {
    format!("{PRESET_UNIFORM_PREFIX}{name}")
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_UNIFORMS.contains(&name)
}
