//! Plugin activation.
//!
//! Plugin metadata lives in a [`PluginRegistry`] built by the host and
//! passed explicitly; the index only persists the activation flags.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{EntityIndex, EntityResult, IndexState, Model, PropPath, SimpleMappingIndex};

/// Metadata of a registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
}

/// Plugins known to the host, in registration order.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: IndexMap<String, PluginInfo>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a plugin.
    pub fn register(&mut self, id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) {
        self.plugins.insert(
            id.into(),
            PluginInfo {
                name: name.into(),
                description: description.into(),
            },
        );
    }

    /// Metadata of `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PluginInfo> {
        self.plugins.get(id)
    }

    /// Registered ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

/// Plugin id → active flag, with `name` and `description` read from the
/// registry.
#[derive(Debug)]
pub struct PluginIndex {
    inner: SimpleMappingIndex,
    registry: Arc<PluginRegistry>,
    props: Vec<String>,
}

impl PluginIndex {
    /// The persisted property.
    pub const ACTIVE: &'static str = "active";

    /// Wraps persisted activation flags. Registered plugins missing from the
    /// model are added as inactive.
    #[must_use]
    pub fn new(mut model: Model, registry: Arc<PluginRegistry>) -> Self {
        for id in registry.ids() {
            model.entry(id.to_string()).or_insert(Value::Bool(false));
        }
        let props = [Self::ACTIVE, "name", "description"]
            .iter()
            .map(ToString::to_string)
            .collect();
        Self {
            inner: SimpleMappingIndex::new(model, Self::ACTIVE),
            registry,
            props,
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

    /// Whether the plugin `id` is active.
    #[must_use]
    pub fn is_active(&self, id: &str) -> bool {
        self.model().get(id).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Activates or deactivates the plugin `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flag cannot be written.
    pub fn set_active(&mut self, id: &str, active: bool) -> EntityResult<()> {
        match self.entity_by_prop_value("value", &Value::from(id)) {
            Some(index) => self.set_entity_prop_value(index, Self::ACTIVE, Some(Value::Bool(active))),
            None => self
                .set_entity_object(
                    crate::entity::EntityObject::with_value(id).prop(Self::ACTIVE, active),
                    false,
                )
                .map(|_| ()),
        }
    }
}

impl EntityIndex for PluginIndex {
    fn state(&self) -> &IndexState {
        self.inner.state()
    }

    fn state_mut(&mut self) -> &mut IndexState {
        self.inner.state_mut()
    }

    fn field_props(&self) -> &[String] {
        &self.props
    }

    fn filter_props(&self) -> &[PropPath] {
        self.inner.filter_props()
    }

    fn field_value(&self, index: usize, name: &str) -> Option<Value> {
        if name == Self::ACTIVE {
            return self.inner.field_value(index, name);
        }
        let id = self.entity_value(index)?.as_str()?;
        let info = self.registry.get(id)?;
        match name {
            "name" => Some(Value::from(info.name.as_str())),
            "description" => Some(Value::from(info.description.as_str())),
            _ => None,
        }
    }

    fn write_field(&mut self, index: usize, name: &str, value: Option<Value>) -> EntityResult<()> {
        // registry props are read-only
        if name == Self::ACTIVE {
            self.inner.write_field(index, name, value)
        } else {
            Ok(())
        }
    }

    fn validate_items(&self, items: &[Value]) -> EntityResult<()> {
        self.inner.validate_items(items)
    }

    fn replace_value(&mut self, index: usize, value: Value) -> EntityResult<()> {
        self.inner.replace_value(index, value)
    }

    fn handle_value_replace(&mut self, old: &Value, new: &Value) {
        self.inner.handle_value_replace(old, new);
    }

    fn delete_prop_values(&mut self, index: usize) {
        self.inner.delete_prop_values(index);
    }

    fn items_replaced(&mut self) {
        self.inner.items_replaced();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityObject;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> Arc<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        registry.register("history", "History", "Keeps sent requests");
        registry.register("jsonDiff", "JSON diff", "Compares two responses");
        Arc::new(registry)
    }

    #[test]
    fn metadata_comes_from_the_registry() {
        let model: Model = serde_json::from_value(json!({ "history": true })).unwrap();
        let index = PluginIndex::new(model, registry());

        assert_eq!(index.len(), 2);
        assert_eq!(
            index.entity_object(1),
            Some(
                EntityObject::at(1, "jsonDiff")
                    .prop("active", false)
                    .prop("name", "JSON diff")
                    .prop("description", "Compares two responses")
            )
        );
        assert!(index.is_active("history"));
    }

    #[test]
    fn overwrite_only_persists_the_flag() {
        let mut index = PluginIndex::new(Model::new(), registry());

        let object = EntityObject::at(0, "history").prop("active", true).prop("name", "Renamed");
        index.set_entity_object(object, true).unwrap();
        index.set_active("jsonDiff", true).unwrap();

        assert_eq!(index.model().get("history"), Some(&json!(true)));
        assert_eq!(index.entity_prop_value(0, "name"), Some(json!("History")));
        assert!(index.is_active("jsonDiff"));
    }
}
