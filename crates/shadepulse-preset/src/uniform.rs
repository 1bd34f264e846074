//! Typed uniform values and preset uniform declarations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::builtins;
use crate::PresetError;

/// A value uploadable to a shader uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    /// Texture unit index for a sampler uniform.
    Sampler(u32),
}

impl UniformValue {
    /// Builds a float-based value from loose components, checking the arity.
    pub fn from_components(c: &[f32]) -> Result<Self, PresetError> {
        Ok(match *c {
            [x] => UniformValue::Float(x),
            [x, y] => UniformValue::Vec2([x, y]),
            [x, y, z] => UniformValue::Vec3([x, y, z]),
            [x, y, z, w] => UniformValue::Vec4([x, y, z, w]),
            _ if c.len() == 9 => {
                let mut m = [0.0; 9];
                m.copy_from_slice(c);
                UniformValue::Mat3(m)
            }
            _ if c.len() == 16 => {
                let mut m = [0.0; 16];
                m.copy_from_slice(c);
                UniformValue::Mat4(m)
            }
            _ => return Err(PresetError::Arity(c.len())),
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "float",
            UniformValue::Int(_) => "int",
            UniformValue::Bool(_) => "bool",
            UniformValue::Vec2(_) => "vec2",
            UniformValue::Vec3(_) => "vec3",
            UniformValue::Vec4(_) => "vec4",
            UniformValue::Mat3(_) => "mat3",
            UniformValue::Mat4(_) => "mat4",
            UniformValue::Sampler(_) => "sampler",
        }
    }

    /// False if any float component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        match self {
            UniformValue::Float(x) => x.is_finite(),
            UniformValue::Vec2(v) => v.iter().all(|x| x.is_finite()),
            UniformValue::Vec3(v) => v.iter().all(|x| x.is_finite()),
            UniformValue::Vec4(v) => v.iter().all(|x| x.is_finite()),
            UniformValue::Mat3(m) => m.iter().all(|x| x.is_finite()),
            UniformValue::Mat4(m) => m.iter().all(|x| x.is_finite()),
            UniformValue::Int(_) | UniformValue::Bool(_) | UniformValue::Sampler(_) => true,
        }
    }

    pub fn same_type(&self, other: &UniformValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Component-wise clamp. Integers round-trip through f32; bools and samplers are untouched.
    pub fn clamped(self, min: Option<f32>, max: Option<f32>) -> Self {
        let c = |v: f32| {
            let v = min.map_or(v, |m| v.max(m));
            max.map_or(v, |m| v.min(m))
        };
        match self {
            UniformValue::Float(x) => UniformValue::Float(c(x)),
            UniformValue::Int(x) => UniformValue::Int(c(x as f32).round() as i32),
            UniformValue::Vec2(v) => UniformValue::Vec2(v.map(c)),
            UniformValue::Vec3(v) => UniformValue::Vec3(v.map(c)),
            UniformValue::Vec4(v) => UniformValue::Vec4(v.map(c)),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformType {
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    /// RGB or RGBA, decided by the initial value's length.
    Color,
}

/// Initial value as written in the preset document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
    Array(Vec<f64>),
}

impl RawValue {
    fn describe(&self) -> String {
        match self {
            RawValue::Bool(_) => "bool".into(),
            RawValue::Number(_) => "number".into(),
            RawValue::Array(a) => format!("array of {}", a.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformSpec {
    #[serde(rename = "type")]
    pub ty: UniformType,
    pub value: RawValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f32>,
}

impl UniformSpec {
    pub fn new(ty: UniformType, value: RawValue) -> Self {
        Self {
            ty,
            value,
            min: None,
            max: None,
            step: None,
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Converts the declared value into a typed [`UniformValue`], checking type and arity.
    pub fn initial_value(&self, name: &str) -> Result<UniformValue, PresetError> {
        let mismatch = |expected: &str| PresetError::UniformType {
            name: name.to_string(),
            expected: expected.to_string(),
            found: self.value.describe(),
        };
        let floats = |a: &[f64]| a.iter().map(|&v| v as f32).collect::<Vec<f32>>();

        match (&self.ty, &self.value) {
            (UniformType::Float, RawValue::Number(v)) => Ok(UniformValue::Float(*v as f32)),
            (UniformType::Int, RawValue::Number(v)) if v.fract() == 0.0 => {
                Ok(UniformValue::Int(*v as i32))
            }
            (UniformType::Bool, RawValue::Bool(b)) => Ok(UniformValue::Bool(*b)),
            (UniformType::Vec2, RawValue::Array(a)) if a.len() == 2 => {
                UniformValue::from_components(&floats(a))
            }
            (UniformType::Vec3, RawValue::Array(a)) if a.len() == 3 => {
                UniformValue::from_components(&floats(a))
            }
            (UniformType::Vec4, RawValue::Array(a)) if a.len() == 4 => {
                UniformValue::from_components(&floats(a))
            }
            (UniformType::Color, RawValue::Array(a)) if a.len() == 3 || a.len() == 4 => {
                UniformValue::from_components(&floats(a))
            }
            (UniformType::Float, _) => Err(mismatch("number")),
            (UniformType::Int, _) => Err(mismatch("integer")),
            (UniformType::Bool, _) => Err(mismatch("bool")),
            (UniformType::Vec2, _) => Err(mismatch("array of 2")),
            (UniformType::Vec3, _) => Err(mismatch("array of 3")),
            (UniformType::Vec4, _) => Err(mismatch("array of 4")),
            (UniformType::Color, _) => Err(mismatch("array of 3 or 4")),
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), PresetError> {
        if !is_identifier(name) {
            return Err(PresetError::InvalidUniformName(name.to_string()));
        }
        let exposed = builtins::exposed_name(name);
        if builtins::is_builtin(&exposed) {
            return Err(PresetError::ReservedUniform {
                name: name.to_string(),
                exposed,
            });
        }
        if let (Some(lo), Some(hi)) = (self.min, self.max) {
            if lo > hi {
                return Err(PresetError::InvertedRange {
                    name: name.to_string(),
                });
            }
        }
        self.initial_value(name).map(|_| ())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone)]
struct UniformEntry {
    name: String,
    exposed: String,
    value: UniformValue,
    min: Option<f32>,
    max: Option<f32>,
}

/// Live values of a preset's declared uniforms.
///
/// Created from the declarations when a preset is loaded. Hooks and host controls write here;
/// the pipeline reads it every frame under the exposed (`u_`-prefixed) names.
#[derive(Debug, Clone, Default)]
pub struct PresetUniforms {
    entries: Vec<UniformEntry>,
}

impl PresetUniforms {
    pub fn from_specs(specs: &BTreeMap<String, UniformSpec>) -> Result<Self, PresetError> {
        let mut entries = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            spec.validate(name)?;
            entries.push(UniformEntry {
                name: name.clone(),
                exposed: builtins::exposed_name(name),
                value: spec.initial_value(name)?.clamped(spec.min, spec.max),
                min: spec.min,
                max: spec.max,
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.value)
    }

    /// Sets a declared uniform, keeping its declared type and clamping to its range.
    ///
    /// Returns the value actually stored.
    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<UniformValue, PresetError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| PresetError::UnknownUniform(name.to_string()))?;

        if !value.is_finite() {
            return Err(PresetError::NonFinite(name.to_string()));
        }
        if !entry.value.same_type(&value) {
            return Err(PresetError::UniformType {
                name: name.to_string(),
                expected: entry.value.type_name().to_string(),
                found: value.type_name().to_string(),
            });
        }
        entry.value = value.clamped(entry.min, entry.max);
        Ok(entry.value)
    }

    /// `(declared name, exposed name, value)` in declaration-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, UniformValue)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.exposed.as_str(), e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_map_to_vector_and_matrix_types() {
        assert_eq!(
            UniformValue::from_components(&[1.0]).unwrap(),
            UniformValue::Float(1.0)
        );
        assert!(matches!(
            UniformValue::from_components(&[0.0; 3]).unwrap(),
            UniformValue::Vec3(_)
        ));
        assert!(matches!(
            UniformValue::from_components(&[0.0; 16]).unwrap(),
            UniformValue::Mat4(_)
        ));
        let err = UniformValue::from_components(&[0.0; 5]).unwrap_err();
        assert!(matches!(err, PresetError::Arity(5)));
        assert!(UniformValue::from_components(&[]).is_err());
    }

    #[test]
    fn initial_values_check_arity() {
        let spec = UniformSpec::new(UniformType::Vec3, RawValue::Array(vec![1.0, 0.5]));
        let err = spec.initial_value("tint").unwrap_err();
        assert!(err.to_string().contains("array of 3"), "got: {err}");

        let color = UniformSpec::new(UniformType::Color, RawValue::Array(vec![1.0, 0.5, 0.25, 1.0]));
        assert_eq!(
            color.initial_value("tint").unwrap(),
            UniformValue::Vec4([1.0, 0.5, 0.25, 1.0])
        );

        let int = UniformSpec::new(UniformType::Int, RawValue::Number(2.5));
        assert!(int.initial_value("count").is_err());
    }

    #[test]
    fn reserved_and_malformed_names_are_rejected() {
        let spec = UniformSpec::new(UniformType::Float, RawValue::Number(0.0));
        assert!(matches!(
            spec.validate("time"),
            Err(PresetError::ReservedUniform { .. })
        ));
        assert!(matches!(
            spec.validate("2fast"),
            Err(PresetError::InvalidUniformName(_))
        ));
        assert!(spec.validate("decay").is_ok());
    }

    #[test]
    fn live_values_are_typed_and_clamped() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "decay".to_string(),
            UniformSpec::new(UniformType::Float, RawValue::Number(0.9)).with_range(0.0, 1.0),
        );
        specs.insert(
            "offset".to_string(),
            UniformSpec::new(UniformType::Vec2, RawValue::Array(vec![0.0, 0.0])),
        );
        let mut u = PresetUniforms::from_specs(&specs).unwrap();
        assert_eq!(u.len(), 2);

        let stored = u.set("decay", UniformValue::Float(4.0)).unwrap();
        assert_eq!(stored, UniformValue::Float(1.0));
        assert_eq!(u.get("decay"), Some(UniformValue::Float(1.0)));

        assert!(u.set("decay", UniformValue::Vec2([0.0, 1.0])).is_err());
        assert!(matches!(
            u.set("missing", UniformValue::Float(0.0)),
            Err(PresetError::UnknownUniform(_))
        ));

        let exposed: Vec<&str> = u.iter().map(|(_, exposed, _)| exposed).collect();
        assert_eq!(exposed, vec!["u_decay", "u_offset"]);
    }

    #[test]
    fn initial_value_is_clamped_into_range() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "gain".to_string(),
            UniformSpec::new(UniformType::Float, RawValue::Number(3.0)).with_range(0.0, 2.0),
        );
        let u = PresetUniforms::from_specs(&specs).unwrap();
        assert_eq!(u.get("gain"), Some(UniformValue::Float(2.0)));
    }

    #[test]
    fn non_finite_values_are_refused_and_keep_the_old_value() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "gain".to_string(),
            UniformSpec::new(UniformType::Float, RawValue::Number(0.5)),
        );
        specs.insert(
            "offset".to_string(),
            UniformSpec::new(UniformType::Vec2, RawValue::Array(vec![0.0, 0.0])).with_range(-1.0, 1.0),
        );
        let mut u = PresetUniforms::from_specs(&specs).unwrap();

        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                u.set("gain", UniformValue::Float(bad)),
                Err(PresetError::NonFinite(ref name)) if name == "gain"
            ));
            assert!(matches!(
                u.set("offset", UniformValue::Vec2([0.0, bad])),
                Err(PresetError::NonFinite(_))
            ));
        }
        assert_eq!(u.get("gain"), Some(UniformValue::Float(0.5)));
        assert_eq!(u.get("offset"), Some(UniformValue::Vec2([0.0, 0.0])));
        assert!(u.set("gain", UniformValue::Float(2.0)).is_ok());
    }
}
