//! Per-environment overrides of a constant.

use crate::entity::{Model, SimpleMappingIndex, delegate_entity_index};

/// API environment key → override value.
#[derive(Debug)]
pub struct EnvOverrideIndex {
    inner: SimpleMappingIndex,
}

impl EnvOverrideIndex {
    /// Name of the single declared property.
    pub const PROP: &'static str = "overrideValue";

    /// Wraps the `envValues` of a constant.
    #[must_use]
    pub fn new(model: Model) -> Self {
        Self {
            inner: SimpleMappingIndex::new(model, Self::PROP),
        }
    }

    /// The backing dictionary.
    #[must_use]
    pub const fn model(&self) -> &Model {
        self.inner.model()
    }

    /// Consumes the index, returning the backing dictionary.
    #[must_use]
    pub fn into_model(self) -> Model {
        self.inner.into_model()
    }

    /// The override for `env`, if it is a string.
    #[must_use]
    pub fn value_for(&self, env: &str) -> Option<&str> {
        self.model().get(env).and_then(serde_json::Value::as_str)
    }
}

delegate_entity_index!(EnvOverrideIndex => inner);
