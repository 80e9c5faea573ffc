//! Named constants substituted into requests.
//!
//! A constant has a default value and optional overrides per API
//! environment; the override of the active environment wins.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::EnvOverrideIndex;
use crate::entity::{EntityIndex, EntityResult, MappingIndex, Model, delegate_entity_index};

/// Constants keyed by a generated id.
#[derive(Debug)]
pub struct ConstantIndex {
    inner: MappingIndex,
}

impl ConstantIndex {
    /// Declared properties.
    pub const PROPS: [&'static str; 3] = ["name", "constValue", "envValues"];

    /// Wraps a persisted constant model.
    #[must_use]
    pub fn new(model: Model) -> Self {
        let props = Self::PROPS.iter().map(ToString::to_string).collect();
        Self {
            inner: MappingIndex::new(model, props).with_filter_props(vec![vec!["name".to_string()]]),
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

    /// The overrides of the constant at `index`.
    #[must_use]
    pub fn overrides(&self, index: usize) -> EnvOverrideIndex {
        let model = match self.entity_prop_value(index, "envValues") {
            Some(Value::Object(values)) => values.into_iter().collect(),
            _ => Model::new(),
        };
        EnvOverrideIndex::new(model)
    }

    /// Stores edited overrides for the constant at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range.
    pub fn set_overrides(&mut self, index: usize, overrides: EnvOverrideIndex) -> EntityResult<()> {
        let values: Map<String, Value> = overrides.into_model().into_iter().collect();
        self.set_entity_prop_value(index, "envValues", Some(Value::Object(values)))
    }

    /// Value of the constant at `index` for the API environment `env`.
    #[must_use]
    pub fn effective_value(&self, index: usize, env: Option<&str>) -> Option<String> {
        let overridden = env.and_then(|env| {
            self.entity_prop_value(index, "envValues")?
                .get(env)?
                .as_str()
                .map(str::to_string)
        });
        overridden.or_else(|| text(self.entity_prop_value(index, "constValue")?))
    }

    /// Value of the constant named `name` for `env`.
    #[must_use]
    pub fn resolve(&self, name: &str, env: Option<&str>) -> Option<String> {
        let index = self.entity_by_prop_value("name", &Value::from(name))?;
        self.effective_value(index, env)
    }

    /// Name → value of every named constant for `env`, in index order.
    #[must_use]
    pub fn values_for_env(&self, env: Option<&str>) -> IndexMap<String, String> {
        self.all_indices()
            .iter()
            .filter_map(|&index| {
                let name = text(self.entity_prop_value(index, "name")?)?;
                Some((name, self.effective_value(index, env)?))
            })
            .collect()
    }
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

delegate_entity_index!(ConstantIndex => inner);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityObject;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn constants() -> ConstantIndex {
        let model: Model = serde_json::from_value(json!({
            "c1": { "name": "user", "constValue": "alice", "envValues": { "prod": "bob" } },
            "c2": { "name": "limit", "constValue": 10 },
            "c3": { "constValue": "unnamed" }
        }))
        .unwrap();
        ConstantIndex::new(model)
    }

    #[test]
    fn override_of_active_environment_wins() {
        let index = constants();

        assert_eq!(index.resolve("user", None).as_deref(), Some("alice"));
        assert_eq!(index.resolve("user", Some("dev")).as_deref(), Some("alice"));
        assert_eq!(index.resolve("user", Some("prod")).as_deref(), Some("bob"));
        assert_eq!(index.resolve("limit", Some("prod")).as_deref(), Some("10"));
        assert_eq!(index.resolve("missing", None), None);
    }

    #[test]
    fn values_skip_unnamed_constants() {
        let values = constants().values_for_env(Some("prod"));

        assert_eq!(values.len(), 2);
        assert_eq!(values.get("user").map(String::as_str), Some("bob"));
    }

    #[test]
    fn edited_overrides_are_written_back() {
        let mut index = constants();
        let mut overrides = index.overrides(0);
        assert_eq!(overrides.value_for("prod"), Some("bob"));

        overrides
            .set_entity_object(EntityObject::with_value("qa").prop("overrideValue", "carol"), false)
            .unwrap();
        overrides.delete_entity(0).unwrap();
        index.set_overrides(0, overrides).unwrap();

        assert_eq!(index.resolve("user", Some("qa")).as_deref(), Some("carol"));
        assert_eq!(index.resolve("user", Some("prod")).as_deref(), Some("alice"));
    }

    #[test]
    fn reserved_names_exclude_the_edited_constant() {
        let index = constants();

        let reserved = index.extract_lc_props("name", Some(&json!("c1")));

        assert!(reserved.contains("limit"));
        assert!(!reserved.contains("user"));
    }
}
