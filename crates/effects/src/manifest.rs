//! TOML manifests describing user-supplied effects.
//!
//! A manifest names a fragment shader (and optionally a vertex shader) on disk
//! and lists uniforms either as constants or as `from`/`to` ramps that are
//! interpolated linearly by progress:
//!
//! ```toml
//! name = "vignette-fade"
//! fragment = "vignette.frag"
//!
//! [uniforms]
//! strength = { from = 0.0, to = 1.0 }
//! tint = [1.0, 0.9, 0.8]
//! ```
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::definition::EffectDefinition;
use crate::uniform::{EffectParameters, UniformValue};
use crate::EffectError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EffectManifest {
    pub name: String,
    pub fragment: PathBuf,
    #[serde(default)]
    pub vertex: Option<PathBuf>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requires_advanced_backend: bool,
    #[serde(default)]
    pub uniforms: BTreeMap<String, UniformSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UniformSpec {
    Scalar(f32),
    List(Vec<f32>),
    Constant { value: Components },
    Ramp { from: Components, to: Components },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Components {
    Scalar(f32),
    List(Vec<f32>),
}

impl Components {
    fn to_value(&self) -> Option<UniformValue> {
        match self {
            Components::Scalar(value) => Some(UniformValue::Float(*value)),
            Components::List(values) => UniformValue::from_slice(values),
        }
    }
}

/// A uniform after validation: either fixed or interpolated.
#[derive(Debug, Clone, PartialEq)]
enum ResolvedUniform {
    Fixed(UniformValue),
    Ramp(UniformValue, UniformValue),
}

impl UniformSpec {
    fn resolve(&self, name: &str) -> Result<ResolvedUniform, String> {
        let shape = |components: &Components| {
            components
                .to_value()
                .ok_or_else(|| format!("uniform '{name}' must have 1, 2, 3, 4 or 16 components"))
        };
        match self {
            UniformSpec::Scalar(value) => Ok(ResolvedUniform::Fixed(UniformValue::Float(*value))),
            UniformSpec::List(values) => shape(&Components::List(values.clone())).map(ResolvedUniform::Fixed),
            UniformSpec::Constant { value } => shape(value).map(ResolvedUniform::Fixed),
            UniformSpec::Ramp { from, to } => {
                let from = shape(from)?;
                let to = shape(to)?;
                if from.arity() != to.arity() {
                    return Err(format!(
                        "uniform '{name}' ramp endpoints differ in size ({} vs {})",
                        from.arity(),
                        to.arity()
                    ));
                }
                Ok(ResolvedUniform::Ramp(from, to))
            }
        }
    }
}

impl EffectManifest {
    pub fn from_toml_str(input: &str) -> Result<Self, EffectError> {
        toml::from_str(input).map_err(|err| EffectError::Manifest {
            path: PathBuf::new(),
            message: err.to_string(),
        })
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.name.trim().is_empty() {
            issues.push("manifest name must not be empty".to_string());
        }
        for (name, spec) in &self.uniforms {
            if let Err(issue) = spec.resolve(name) {
                issues.push(issue);
            }
        }
        issues
    }

    /// Reads and validates the manifest at `path`, then loads its shader sources
    /// relative to the manifest's directory.
    pub fn load(path: &Path) -> Result<EffectDefinition, EffectError> {
        let raw = fs::read_to_string(path).map_err(|source| EffectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: EffectManifest = toml::from_str(&raw).map_err(|err| EffectError::Manifest {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.into_definition(base).map_err(|err| match err {
            EffectError::Manifest { message, .. } => EffectError::Manifest {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn into_definition(self, base: &Path) -> Result<EffectDefinition, EffectError> {
        let issues = self.validate();
        if !issues.is_empty() {
            return Err(EffectError::Manifest {
                path: PathBuf::new(),
                message: issues.join("; "),
            });
        }

        let read = |relative: &Path| {
            let full = base.join(relative);
            fs::read_to_string(&full).map_err(|source| EffectError::Io { path: full, source })
        };
        let fragment = read(self.fragment.as_path())?;
        let vertex = self.vertex.as_deref().map(read).transpose()?;

        let uniforms: Vec<(String, ResolvedUniform)> = self
            .uniforms
            .iter()
            .filter_map(|(name, spec)| spec.resolve(name).ok().map(|value| (name.clone(), value)))
            .collect();

        let mut builder = EffectDefinition::builder(self.name)
            .fragment(fragment)
            .requires_advanced_backend(self.requires_advanced_backend)
            .parameters(move |progress| evaluate(&uniforms, progress));
        if let Some(vertex) = vertex {
            builder = builder.vertex(vertex);
        }
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        Ok(builder.build())
    }
}

fn evaluate(uniforms: &[(String, ResolvedUniform)], progress: f32) -> EffectParameters {
    uniforms
        .iter()
        .filter_map(|(name, uniform)| {
            let value = match uniform {
                ResolvedUniform::Fixed(value) => Some(*value),
                ResolvedUniform::Ramp(from, to) => from.lerp(to, progress),
            };
            value.map(|value| (name.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MANIFEST: &str = r#"
name = "vignette-fade"
fragment = "vignette.frag"
description = "Darkens the edges mid-transition"

[uniforms]
strength = { from = 0.0, to = 1.0 }
tint = [1.0, 0.9, 0.8]
radius = 0.75
offset = { value = [0.1, 0.2] }
"#;

    #[test]
    fn parses_uniform_forms() {
        let manifest = EffectManifest::from_toml_str(MANIFEST).expect("parse manifest");
        assert_eq!(manifest.name, "vignette-fade");
        assert!(manifest.validate().is_empty());
        assert!(matches!(manifest.uniforms["strength"], UniformSpec::Ramp { .. }));
        assert!(matches!(manifest.uniforms["tint"], UniformSpec::List(_)));
        assert!(matches!(manifest.uniforms["radius"], UniformSpec::Scalar(_)));
        assert!(matches!(manifest.uniforms["offset"], UniformSpec::Constant { .. }));
    }

    #[test]
    fn reports_bad_uniforms() {
        let manifest = EffectManifest::from_toml_str(
            r#"
name = ""
fragment = "x.frag"

[uniforms]
odd = [1.0, 2.0, 3.0, 4.0, 5.0]
mismatch = { from = 0.0, to = [1.0, 1.0] }
"#,
        )
        .unwrap();
        let issues = manifest.validate();
        assert_eq!(issues.len(), 3, "{issues:?}");
    }

    #[test]
    fn loads_sources_and_interpolates() {
        let dir = tempfile::tempdir().unwrap();
        let mut fragment = std::fs::File::create(dir.path().join("vignette.frag")).unwrap();
        writeln!(fragment, "void main() {{ gl_FragColor = vec4(strength); }}").unwrap();
        let manifest_path = dir.path().join("effect.toml");
        std::fs::write(&manifest_path, MANIFEST).unwrap();

        let effect = EffectManifest::load(&manifest_path).expect("load manifest");
        assert_eq!(effect.name(), "vignette-fade");
        assert!(effect.fragment_source().contains("strength"));
        assert!(effect.vertex_source().contains("attribute vec2 position"));

        let params = effect.parameters(0.5);
        assert_eq!(params.get("strength"), Some(&UniformValue::Float(0.5)));
        assert_eq!(params.get("radius"), Some(&UniformValue::Float(0.75)));
        assert_eq!(params.get("tint"), Some(&UniformValue::Vec3([1.0, 0.9, 0.8])));
        assert_eq!(params.get("offset"), Some(&UniformValue::Vec2([0.1, 0.2])));
    }

    #[test]
    fn missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("effect.toml");
        std::fs::write(&manifest_path, MANIFEST).unwrap();
        let err = EffectManifest::load(&manifest_path).unwrap_err();
        assert!(matches!(err, EffectError::Io { .. }));
    }
}
