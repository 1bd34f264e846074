//! Preset shown when the config names none (or names one that cannot be read).

use shadepulse_preset::{Preset, RawValue, UniformSpec, UniformType};

const FRAGMENT: &str = r#"#version 300 es
precision highp float;
in vec2 v_uv;
uniform sampler2D u_previousFrame;
uniform sampler2D u_spectrum;
uniform sampler2D u_waveform;
uniform vec2 u_resolution;
uniform float u_time;
uniform float u_bass;
uniform float u_beatStrength;
uniform float u_decay;
uniform float u_zoom;
uniform vec3 u_tint;
out vec4 fragColor;

void main() {
    // Zoom the previous frame towards the centre so trails drift outwards.
    vec2 p = (v_uv - 0.5) / (1.0 + u_zoom * (1.0 + u_bass));
    vec4 prev = texture(u_previousFrame, p + 0.5) * u_decay;

    float bar = texture(u_spectrum, vec2(v_uv.x, 0.5)).r;
    float wave = texture(u_waveform, vec2(v_uv.x, 0.5)).r;
    float line = smoothstep(3.0 / u_resolution.y, 0.0, abs(v_uv.y - wave));

    vec3 hue = 0.5 + 0.5 * cos(u_time * 0.3 + v_uv.x * 6.2831 + vec3(0.0, 2.0, 4.0));
    vec3 col = u_tint * hue * step(v_uv.y, bar * 0.8) + vec3(line);
    col += u_beatStrength * 0.15;

    fragColor = max(prev, vec4(col, 1.0));
}
"#;

pub fn preset() -> Preset {
    Preset::new("Spectrum Tunnel", "shadepulse", FRAGMENT)
        .with_uniform(
            "decay",
            UniformSpec::new(UniformType::Float, RawValue::Number(0.94)).with_range(0.0, 1.0),
        )
        .with_uniform(
            "zoom",
            UniformSpec::new(UniformType::Float, RawValue::Number(0.01)).with_range(0.0, 0.2),
        )
        .with_uniform(
            "tint",
            UniformSpec::new(UniformType::Color, RawValue::Array(vec![0.9, 0.6, 1.0])),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_preset_is_valid() {
        let p = preset();
        p.validate().unwrap();
        assert_eq!(p.name(), "Spectrum Tunnel");
    }
}
