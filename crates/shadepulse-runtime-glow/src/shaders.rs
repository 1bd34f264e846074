//! Built-in GLSL ES 3.00 sources.

/// Pass-through fullscreen vertex shader used when a preset has no `shaders.vertex`.
///
/// Feeds `v_uv` in 0..1 with the origin at the bottom-left, matching texture space.
pub const DEFAULT_VERTEX: &str = r#"#version 300 es
layout(location = 0) in vec2 a_position;
out vec2 v_uv;
void main() {
    v_uv = a_position * 0.5 + 0.5;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
"#;

/// Straight texture copy used to composite the feedback target onto the display.
pub const COPY_FRAGMENT: &str = r#"#version 300 es
precision highp float;
in vec2 v_uv;
uniform sampler2D u_source;
out vec4 fragColor;
void main() {
    fragColor = texture(u_source, v_uv);
}
"#;

/// Sampler uniform of [`COPY_FRAGMENT`].
pub const COPY_SOURCE_UNIFORM: &str = "u_source";
