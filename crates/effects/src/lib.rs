//! Transition effects for the carousel renderer.
//!
//! Modules:
//!
//! - `uniform` defines `UniformValue`, the arity-tagged value type every
//!   backend knows how to upload, and the `EffectParameters` map.
//! - `definition` holds the immutable `EffectDefinition`, its builder, the
//!   optional draw hooks and custom mesh data.
//! - `catalog` ships the built-in effects and the default quad/crossfade
//!   shader pair.
//! - `registry` maps names to shared definitions with a fallback default.
//! - `manifest` loads user effects from TOML files.
use std::path::PathBuf;

pub mod catalog;
pub mod definition;
pub mod manifest;
pub mod registry;
pub mod uniform;

pub use catalog::{builtin_effects, BASELINE_EFFECT};
pub use definition::{
    EffectBuilder, EffectDefinition, EffectHooks, EffectRequirements, MeshData, INSTANCE_STRIDE,
    VERTEX_STRIDE,
};
pub use manifest::EffectManifest;
pub use registry::EffectRegistry;
pub use uniform::{EffectParameters, UniformValue};

#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("invalid effect: {0}")]
    Validation(String),
    #[error("effect '{0}' is not registered")]
    NotFound(String),
    #[error("invalid effect manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
