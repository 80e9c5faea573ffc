//! API environments: base URL and display name per environment key.

use serde_json::Value;

use crate::entity::{EntityIndex, MappingIndex, Model, delegate_entity_index};

/// Environments keyed by a stable id.
#[derive(Debug)]
pub struct ApiEnvIndex {
    inner: MappingIndex,
}

impl ApiEnvIndex {
    /// Declared properties.
    pub const PROPS: [&'static str; 4] = ["url", "name", "cors", "envVars"];

    /// Wraps a persisted environment model.
    #[must_use]
    pub fn new(model: Model) -> Self {
        let props = Self::PROPS.iter().map(ToString::to_string).collect();
        Self {
            inner: MappingIndex::new(model, props),
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

    /// Position of the environment stored under `key`.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<usize> {
        self.entity_by_prop_value("value", &Value::from(key))
    }

    /// Base URL of the environment stored under `key`.
    #[must_use]
    pub fn url(&self, key: &str) -> Option<String> {
        let index = self.find(key)?;
        self.entity_prop_value(index, "url")
            .and_then(|url| url.as_str().map(str::to_string))
    }

    /// Display name of the environment stored under `key`, falling back to
    /// the key itself.
    #[must_use]
    pub fn display_name(&self, key: &str) -> String {
        self.find(key)
            .and_then(|index| self.entity_prop_value(index, "name"))
            .and_then(|name| name.as_str().map(str::to_string))
            .unwrap_or_else(|| key.to_string())
    }
}

delegate_entity_index!(ApiEnvIndex => inner);
