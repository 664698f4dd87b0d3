use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::uniform::EffectParameters;

/// Floats per mesh vertex: position (xyz) followed by texcoord (uv).
pub const VERTEX_STRIDE: usize = 5;
/// Floats per instance: position (3), rotation quaternion (4), scale (2), extra (3).
pub const INSTANCE_STRIDE: usize = 12;

pub type ParameterFn = Arc<dyn Fn(f32) -> EffectParameters + Send + Sync>;

/// Optional side channel around a draw. Both hooks default to doing nothing.
pub trait EffectHooks: Send + Sync {
    fn pre_draw(&self, _progress: f32, _parameters: &mut EffectParameters) {}

    fn post_draw(&self, _progress: f32) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectRequirements {
    pub advanced_backend: bool,
    pub custom_mesh: bool,
}

impl EffectRequirements {
    pub fn needs_advanced_backend(&self) -> bool {
        self.advanced_backend || self.custom_mesh
    }
}

/// Geometry an effect draws instead of the default quad.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub instances: Vec<f32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    /// Non-instanced meshes draw a single instance.
    pub fn instance_count(&self) -> usize {
        (self.instances.len() / INSTANCE_STRIDE).max(1)
    }

    pub fn is_instanced(&self) -> bool {
        !self.instances.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.vertices.is_empty() || self.vertices.len() % VERTEX_STRIDE != 0 {
            return Err(format!(
                "mesh vertex data must be a non-empty multiple of {VERTEX_STRIDE} floats (got {})",
                self.vertices.len()
            ));
        }
        if self.instances.len() % INSTANCE_STRIDE != 0 {
            return Err(format!(
                "mesh instance data must be a multiple of {INSTANCE_STRIDE} floats (got {})",
                self.instances.len()
            ));
        }
        if self.indices.is_empty() {
            return Err("mesh index buffer is empty".into());
        }
        let vertex_count = self.vertex_count() as u32;
        if let Some(bad) = self.indices.iter().find(|&&index| index >= vertex_count) {
            return Err(format!(
                "mesh index {bad} is out of range for {vertex_count} vertices"
            ));
        }
        Ok(())
    }
}

/// A named transition: a shader pair plus a pure progress-to-parameters map.
///
/// Definitions are immutable once built and shared as `Arc<EffectDefinition>`.
#[derive(Clone)]
pub struct EffectDefinition {
    name: String,
    vertex_source: Cow<'static, str>,
    fragment_source: Cow<'static, str>,
    parameters: ParameterFn,
    hooks: Option<Arc<dyn EffectHooks>>,
    requirements: EffectRequirements,
    mesh: Option<Arc<MeshData>>,
    description: Option<String>,
}

impl EffectDefinition {
    pub fn builder(name: impl Into<String>) -> EffectBuilder {
        EffectBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn parameters(&self, progress: f32) -> EffectParameters {
        (self.parameters)(progress)
    }

    pub fn pre_draw(&self, progress: f32, parameters: &mut EffectParameters) {
        if let Some(hooks) = &self.hooks {
            hooks.pre_draw(progress, parameters);
        }
    }

    pub fn post_draw(&self, progress: f32) {
        if let Some(hooks) = &self.hooks {
            hooks.post_draw(progress);
        }
    }

    pub fn requirements(&self) -> EffectRequirements {
        self.requirements
    }

    pub fn mesh(&self) -> Option<&Arc<MeshData>> {
        self.mesh.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl fmt::Debug for EffectDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDefinition")
            .field("name", &self.name)
            .field("requirements", &self.requirements)
            .field("has_hooks", &self.hooks.is_some())
            .field("has_mesh", &self.mesh.is_some())
            .finish()
    }
}

pub struct EffectBuilder {
    name: String,
    vertex_source: Cow<'static, str>,
    fragment_source: Cow<'static, str>,
    parameters: ParameterFn,
    hooks: Option<Arc<dyn EffectHooks>>,
    requirements: EffectRequirements,
    mesh: Option<Arc<MeshData>>,
    description: Option<String>,
}

impl EffectBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex_source: Cow::Borrowed(crate::catalog::QUAD_VERTEX_SHADER),
            fragment_source: Cow::Borrowed(crate::catalog::CROSSFADE_FRAGMENT_SHADER),
            parameters: Arc::new(|_| EffectParameters::new()),
            hooks: None,
            requirements: EffectRequirements::default(),
            mesh: None,
            description: None,
        }
    }

    pub fn vertex(mut self, source: impl Into<Cow<'static, str>>) -> Self {
        self.vertex_source = source.into();
        self
    }

    pub fn fragment(mut self, source: impl Into<Cow<'static, str>>) -> Self {
        self.fragment_source = source.into();
        self
    }

    pub fn parameters<F>(mut self, parameters: F) -> Self
    where
        F: Fn(f32) -> EffectParameters + Send + Sync + 'static,
    {
        self.parameters = Arc::new(parameters);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn EffectHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn requires_advanced_backend(mut self, required: bool) -> Self {
        self.requirements.advanced_backend = required;
        self
    }

    /// Installs a custom mesh; implies the custom-mesh requirement.
    pub fn mesh(mut self, mesh: MeshData) -> Self {
        self.requirements.custom_mesh = true;
        self.mesh = Some(Arc::new(mesh));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn build(self) -> EffectDefinition {
        EffectDefinition {
            name: self.name,
            vertex_source: self.vertex_source,
            fragment_source: self.fragment_source,
            parameters: self.parameters,
            hooks: self.hooks,
            requirements: self.requirements,
            mesh: self.mesh,
            description: self.description,
        }
    }
}
