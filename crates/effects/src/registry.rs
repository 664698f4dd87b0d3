use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{builtin_effects, BASELINE_EFFECT};
use crate::definition::EffectDefinition;
use crate::EffectError;

/// Name to effect map with a fallback default. Last registration wins.
#[derive(Debug, Clone)]
pub struct EffectRegistry {
    effects: HashMap<String, Arc<EffectDefinition>>,
    default_name: String,
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl EffectRegistry {
    /// Empty registry whose default still names the baseline crossfade.
    pub fn empty() -> Self {
        Self {
            effects: HashMap::new(),
            default_name: BASELINE_EFFECT.to_string(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for effect in builtin_effects() {
            registry.insert(Arc::new(effect));
        }
        registry
    }

    pub fn register(&mut self, effect: EffectDefinition) -> Result<Arc<EffectDefinition>, EffectError> {
        self.register_shared(Arc::new(effect))
    }

    pub fn register_shared(
        &mut self,
        effect: Arc<EffectDefinition>,
    ) -> Result<Arc<EffectDefinition>, EffectError> {
        if effect.name().trim().is_empty() {
            return Err(EffectError::Validation(
                "effect name must not be empty".into(),
            ));
        }
        if self.effects.contains_key(effect.name()) {
            tracing::warn!(effect = effect.name(), "overwriting registered effect");
        }
        self.insert(Arc::clone(&effect));
        Ok(effect)
    }

    pub fn get(&self, name: &str) -> Option<Arc<EffectDefinition>> {
        self.effects.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.effects.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.effects.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), EffectError> {
        if !self.has(name) {
            return Err(EffectError::NotFound(name.to_string()));
        }
        self.default_name = name.to_string();
        Ok(())
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn default_effect(&self) -> Option<Arc<EffectDefinition>> {
        self.get(&self.default_name)
    }

    /// Looks up `name`, falling back to the default effect and then the
    /// built-in crossfade.
    pub fn resolve(&self, name: &str) -> Arc<EffectDefinition> {
        self.get(name)
            .or_else(|| self.default_effect())
            .or_else(|| self.get(BASELINE_EFFECT))
            .unwrap_or_else(|| Arc::new(crate::catalog::crossfade()))
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    fn insert(&mut self, effect: Arc<EffectDefinition>) {
        self.effects.insert(effect.name().to_string(), effect);
    }
}
