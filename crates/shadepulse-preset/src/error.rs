use shadepulse_core::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("preset json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reading preset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("uniform '{0}' is not a valid identifier")]
    InvalidUniformName(String),

    #[error("uniform '{name}' is exposed as '{exposed}', which is reserved for a built-in")]
    ReservedUniform { name: String, exposed: String },

    #[error("uniform '{name}' expects {expected}, got {found}")]
    UniformType {
        name: String,
        expected: String,
        found: String,
    },

    #[error("uniform value has {0} components; expected 1, 2, 3, 4, 9 or 16")]
    Arity(usize),

    #[error("uniform '{name}' has min > max")]
    InvertedRange { name: String },

    #[error("uniform '{0}' value is not finite")]
    NonFinite(String),

    #[error("unknown uniform '{0}'")]
    UnknownUniform(String),
}

impl From<PresetError> for EngineError {
    fn from(e: PresetError) -> Self {
        EngineError::InvalidPreset(e.to_string())
    }
}
