//! JSON engine configuration.
//!
//! Every field has a default so an empty object (`{}`) is a valid config. Loading validates the
//! values the audio and render paths rely on (power-of-two FFT size, sane decibel range, non-zero
//! surface size).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioSettings,
    pub beat: BeatSettings,
    pub render: RenderSettings,
    /// Optional preset document to load at startup.
    pub preset: Option<PathBuf>,
    /// Optional OSC bind address, e.g. "127.0.0.1:9000".
    pub osc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Transform size. The spectrum has `fft_size / 2` bins, the waveform `fft_size` samples.
    pub fft_size: usize,
    /// Analyser time smoothing in `[0, 1)`.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Used for frequency-to-bin mapping when no source is connected.
    pub fallback_sample_rate: f32,
    pub bands: BandSettings,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            fallback_sample_rate: 44_100.0,
            bands: BandSettings::Fractional,
        }
    }
}

impl AudioSettings {
    pub fn spectrum_len(&self) -> usize {
        self.fft_size / 2
    }

    pub fn waveform_len(&self) -> usize {
        self.fft_size
    }
}

/// How bass/treble bin ranges are chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandSettings {
    /// Fixed fractions of the spectrum length (sample-rate agnostic).
    Fractional,
    /// Absolute frequencies mapped through the source's sample rate.
    Hz { bass_max_hz: f32, treble_min_hz: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatSettings {
    pub history: usize,
    pub threshold: f32,
    pub variance_threshold: f32,
    pub minimum_interval_ms: f64,
}

impl Default for BeatSettings {
    fn default() -> Self {
        Self {
            history: 43,
            threshold: 1.3,
            variance_threshold: 0.1,
            minimum_interval_ms: 300.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: i32,
    pub height: i32,
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 960,
            height: 540,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl EngineConfig {
    /// Checks the invariants downstream code assumes. `path` is only used for error context.
    pub fn validate(&self, path: &Path) -> Result<(), EngineError> {
        let invalid = |msg: String| EngineError::InvalidConfig {
            path: path.to_path_buf(),
            msg,
        };

        let n = self.audio.fft_size;
        if !n.is_power_of_two() || !(32..=32_768).contains(&n) {
            return Err(invalid(format!(
                "audio.fft_size must be a power of two in 32..=32768, got {n}"
            )));
        }
        if !(0.0..1.0).contains(&self.audio.smoothing) {
            return Err(invalid(format!(
                "audio.smoothing must be in [0, 1), got {}",
                self.audio.smoothing
            )));
        }
        if self.audio.min_decibels >= self.audio.max_decibels {
            return Err(invalid(
                "audio.min_decibels must be below audio.max_decibels".into(),
            ));
        }
        if self.audio.fallback_sample_rate <= 0.0 {
            return Err(invalid("audio.fallback_sample_rate must be > 0".into()));
        }
        if let BandSettings::Hz {
            bass_max_hz,
            treble_min_hz,
        } = self.audio.bands
        {
            if bass_max_hz <= 0.0 || treble_min_hz <= bass_max_hz {
                return Err(invalid(
                    "audio.bands.hz needs 0 < bass_max_hz < treble_min_hz".into(),
                ));
            }
        }

        if self.beat.history == 0 {
            return Err(invalid("beat.history must be > 0".into()));
        }
        if self.beat.threshold <= 0.0 || self.beat.minimum_interval_ms < 0.0 {
            return Err(invalid(
                "beat.threshold must be > 0 and beat.minimum_interval_ms >= 0".into(),
            ));
        }

        if self.render.width <= 0 || self.render.height <= 0 {
            return Err(invalid("render.width/height must be > 0".into()));
        }
        Ok(())
    }
}

/// Reads and deserializes any JSON document, attaching the path to errors.
pub fn load_typed_json<T: DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| EngineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads and validates an [`EngineConfig`].
pub fn load_engine_config_from(path: &Path) -> Result<EngineConfig, EngineError> {
    let cfg: EngineConfig = load_typed_json(path)?;
    cfg.validate(path)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> EngineConfig {
        serde_json::from_str(json).expect("config json")
    }

    #[test]
    fn empty_object_is_all_defaults() {
        let cfg = parse("{}");
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.audio.spectrum_len(), 1024);
        assert_eq!(cfg.audio.waveform_len(), 2048);
        assert_eq!(cfg.beat.history, 43);
        assert!(cfg.validate(Path::new("mem")).is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse(r#"{"beat": {"threshold": 1.5}, "render": {"width": 1280}}"#);
        assert!((cfg.beat.threshold - 1.5).abs() < 1e-6);
        assert!((cfg.beat.variance_threshold - 0.1).abs() < 1e-6);
        assert_eq!(cfg.render.width, 1280);
        assert_eq!(cfg.render.height, 540);
    }

    #[test]
    fn band_settings_accept_both_shapes() {
        let cfg = parse(r#"{"audio": {"bands": "fractional"}}"#);
        assert_eq!(cfg.audio.bands, BandSettings::Fractional);

        let cfg = parse(r#"{"audio": {"bands": {"hz": {"bass_max_hz": 250, "treble_min_hz": 6000}}}}"#);
        assert_eq!(
            cfg.audio.bands,
            BandSettings::Hz {
                bass_max_hz: 250.0,
                treble_min_hz: 6000.0
            }
        );
    }

    #[test]
    fn non_power_of_two_fft_is_rejected() {
        let cfg = parse(r#"{"audio": {"fft_size": 1000}}"#);
        let err = cfg.validate(Path::new("engine.json")).expect_err("must reject");
        assert!(err.to_string().contains("fft_size"), "got: {err}");
    }

    #[test]
    fn inverted_decibel_range_is_rejected() {
        let cfg = parse(r#"{"audio": {"min_decibels": -20, "max_decibels": -30}}"#);
        assert!(cfg.validate(Path::new("engine.json")).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_engine_config_from(Path::new("/definitely/not/here.json"))
            .expect_err("must fail");
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
