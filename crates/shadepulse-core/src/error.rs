use std::path::PathBuf;

/// Engine-level errors used across shadepulse crates.
///
/// Construction failures (config, GPU objects, shader programs, audio devices, presets) are
/// reported through this type. Per-frame problems never are: those are logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ---- Config ----
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json parse error at {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config at {}: {msg}", path.display())]
    InvalidConfig { path: PathBuf, msg: String },

    // ---- GPU backend ----
    #[error("vertex shader compile error: {0}")]
    VertexCompile(String),

    #[error("fragment shader compile error: {0}")]
    FragmentCompile(String),

    #[error("program link error: {0}")]
    Link(String),

    #[error("backend object creation failed: {0}")]
    GlCreate(String),

    // ---- Audio / content ----
    #[error("audio input unavailable: {0}")]
    AudioUnavailable(String),

    #[error("invalid preset: {0}")]
    InvalidPreset(String),

    // ---- Fallback ----
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn other<T: Into<String>>(s: T) -> Self {
        EngineError::Other(s.into())
    }

    /// True for shader compile/link failures (the GPU-provided diagnostic is in the message).
    pub fn is_shader_error(&self) -> bool {
        matches!(
            self,
            EngineError::VertexCompile(_) | EngineError::FragmentCompile(_) | EngineError::Link(_)
        )
    }
}
