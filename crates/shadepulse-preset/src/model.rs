use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::hooks::{HookError, PresetHooks, UpdateContext};
use crate::uniform::{PresetUniforms, UniformSpec};
use crate::PresetError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetMetadata {
    pub name: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetShaders {
    /// Defaults to the runtime's pass-through fullscreen vertex shader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex: Option<String>,
    pub fragment: String,
}

/// A self-contained visual effect: shaders, declared uniforms and optional hooks.
///
/// The declarative part round-trips through JSON; hooks are attached in code.
#[derive(Debug, Serialize, Deserialize)]
pub struct Preset {
    pub metadata: PresetMetadata,
    pub shaders: PresetShaders,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub uniforms: BTreeMap<String, UniformSpec>,
    #[serde(skip)]
    pub hooks: PresetHooks,
}

impl Preset {
    pub fn new(name: impl Into<String>, author: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            metadata: PresetMetadata {
                name: name.into(),
                author: author.into(),
                description: None,
                version: None,
                tags: Vec::new(),
            },
            shaders: PresetShaders {
                vertex: None,
                fragment: fragment.into(),
            },
            uniforms: BTreeMap::new(),
            hooks: PresetHooks::default(),
        }
    }

    pub fn with_vertex(mut self, vertex: impl Into<String>) -> Self {
        self.shaders.vertex = Some(vertex.into());
        self
    }

    pub fn with_uniform(mut self, name: impl Into<String>, spec: UniformSpec) -> Self {
        self.uniforms.insert(name.into(), spec);
        self
    }

    pub fn with_init(
        mut self,
        f: impl FnMut(&mut PresetUniforms) -> Result<(), HookError> + 'static,
    ) -> Self {
        self.hooks.init = Some(Box::new(f));
        self
    }

    pub fn with_update(
        mut self,
        f: impl FnMut(&UpdateContext<'_>, &mut PresetUniforms) -> Result<(), HookError> + 'static,
    ) -> Self {
        self.hooks.update = Some(Box::new(f));
        self
    }

    pub fn with_destroy(mut self, f: impl FnOnce() -> Result<(), HookError> + 'static) -> Self {
        self.hooks.destroy = Some(Box::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Checks required fields and every uniform declaration.
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.metadata.name.trim().is_empty() {
            return Err(PresetError::MissingField("metadata.name"));
        }
        if self.metadata.author.trim().is_empty() {
            return Err(PresetError::MissingField("metadata.author"));
        }
        if self.shaders.fragment.trim().is_empty() {
            return Err(PresetError::MissingField("shaders.fragment"));
        }
        if matches!(&self.shaders.vertex, Some(v) if v.trim().is_empty()) {
            return Err(PresetError::MissingField("shaders.vertex"));
        }
        for (name, spec) in &self.uniforms {
            spec.validate(name)?;
        }
        Ok(())
    }

    /// Parses and validates a preset document.
    pub fn from_json_str(json: &str) -> Result<Self, PresetError> {
        let preset: Preset = serde_json::from_str(json)?;
        preset.validate()?;
        Ok(preset)
    }

    pub fn from_json_path(path: &Path) -> Result<Self, PresetError> {
        let text = std::fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniform::{RawValue, UniformType, UniformValue};

    const DOC: &str = r#"{
        "metadata": {"name": "Tunnel", "author": "shadepulse", "tags": ["feedback"]},
        "shaders": {"fragment": "void main() {}"},
        "uniforms": {
            "decay": {"type": "float", "value": 0.95, "min": 0.0, "max": 1.0, "step": 0.01},
            "tint": {"type": "color", "value": [1.0, 0.2, 0.6]}
        }
    }"#;

    #[test]
    fn document_parses_with_optional_parts() {
        let p = Preset::from_json_str(DOC).expect("valid preset");
        assert_eq!(p.name(), "Tunnel");
        assert!(p.shaders.vertex.is_none());
        assert_eq!(p.metadata.tags, vec!["feedback".to_string()]);
        assert_eq!(p.uniforms.len(), 2);
        assert!(p.hooks.is_empty());

        let u = PresetUniforms::from_specs(&p.uniforms).unwrap();
        assert_eq!(u.get("tint"), Some(UniformValue::Vec3([1.0, 0.2, 0.6])));
    }

    #[test]
    fn missing_fragment_is_rejected() {
        let err = Preset::from_json_str(
            r#"{"metadata": {"name": "x", "author": "y"}, "shaders": {}}"#,
        )
        .expect_err("fragment is required");
        assert!(err.to_string().contains("fragment"), "got: {err}");
    }

    #[test]
    fn blank_author_is_rejected() {
        let p = Preset::new("x", "  ", "void main() {}");
        assert!(matches!(
            p.validate(),
            Err(PresetError::MissingField("metadata.author"))
        ));
    }

    #[test]
    fn round_trips_declarative_part() {
        let p = Preset::new("Bars", "me", "void main() {}")
            .with_uniform(
                "count",
                UniformSpec::new(UniformType::Int, RawValue::Number(32.0)),
            )
            .with_update(|_, _| Ok(()));
        let json = p.to_json_string().unwrap();
        let back = Preset::from_json_str(&json).unwrap();
        assert_eq!(back.metadata, p.metadata);
        assert_eq!(back.uniforms, p.uniforms);
        assert!(back.hooks.update.is_none(), "hooks never come from JSON");
    }
}
