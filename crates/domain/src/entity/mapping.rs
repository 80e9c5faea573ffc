//! Indices projected from an ordered key to record dictionary.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::{EntityError, EntityIndex, EntityResult, IndexState, PropPath, delegate_entity_index};

/// Persisted form of a mapping index.
pub type Model = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `model[key][prop]`.
    Records,
    /// `model[key]` is the value of the single declared prop.
    Scalar,
}

impl Layout {
    fn placeholder(self) -> Value {
        match self {
            Self::Records => Value::Object(Map::new()),
            Self::Scalar => Value::Null,
        }
    }
}

/// An index whose values are the keys of `model`, in model order.
///
/// After every public call the model holds exactly the item keys, in item
/// order.
#[derive(Debug)]
pub struct MappingIndex {
    state: IndexState,
    model: Model,
    props: Vec<String>,
    filter_props: Vec<PropPath>,
    layout: Layout,
}

impl MappingIndex {
    /// Creates an index reading `props` from the records of `model`.
    #[must_use]
    pub fn new(model: Model, props: Vec<String>) -> Self {
        Self::with_layout(model, props, Layout::Records)
    }

    fn with_layout(model: Model, props: Vec<String>, layout: Layout) -> Self {
        let mut index = Self {
            state: IndexState::default(),
            model: Model::new(),
            props,
            filter_props: Vec::new(),
            layout,
        };
        index.set_model(model, false);
        index
    }

    /// Sets the property paths searched by text filters.
    #[must_use]
    pub fn with_filter_props(mut self, filter_props: Vec<PropPath>) -> Self {
        self.filter_props = filter_props;
        self
    }

    /// The backing dictionary.
    #[must_use]
    pub const fn model(&self) -> &Model {
        &self.model
    }

    /// Consumes the index, returning the backing dictionary.
    #[must_use]
    pub fn into_model(self) -> Model {
        self.model
    }

    /// Replaces the dictionary and rebuilds the items from its keys.
    pub fn set_model(&mut self, model: Model, notify: bool) {
        let items = model.keys().cloned().map(Value::String).collect();
        self.model = model;
        self.state.replace_items(items);
        if notify {
            self.notify();
        }
    }

    fn key(&self, index: usize) -> Option<&str> {
        self.state.items().get(index).and_then(Value::as_str)
    }

    /// Rebuilds the model in item order, creating missing records and
    /// dropping records whose key is gone.
    fn sync_model(&mut self) {
        let mut model = Model::with_capacity(self.state.items().len());
        for key in self.state.items().iter().filter_map(Value::as_str) {
            let record = self
                .model
                .swap_remove(key)
                .unwrap_or_else(|| self.layout.placeholder());
            model.insert(key.to_string(), record);
        }
        self.model = model;
    }
}

fn key_of(value: &Value) -> EntityResult<&str> {
    value
        .as_str()
        .ok_or_else(|| EntityError::InvalidValue(format!("mapping keys must be strings, got {value}")))
}

impl EntityIndex for MappingIndex {
    fn state(&self) -> &IndexState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut IndexState {
        &mut self.state
    }

    fn field_props(&self) -> &[String] {
        &self.props
    }

    fn filter_props(&self) -> &[PropPath] {
        &self.filter_props
    }

    fn field_value(&self, index: usize, name: &str) -> Option<Value> {
        let record = self.model.get(self.key(index)?)?;
        match self.layout {
            Layout::Records => record.get(name).cloned(),
            Layout::Scalar => Some(record.clone()).filter(|value| !value.is_null()),
        }
    }

    fn write_field(&mut self, index: usize, name: &str, value: Option<Value>) -> EntityResult<()> {
        let Some(key) = self.key(index).map(str::to_string) else {
            return Ok(());
        };
        let layout = self.layout;
        let record = self.model.entry(key).or_insert_with(|| layout.placeholder());
        match layout {
            Layout::Records => {
                if !record.is_object() {
                    *record = layout.placeholder();
                }
                if let Value::Object(fields) = record {
                    match value {
                        Some(value) => fields.insert(name.to_string(), value),
                        None => fields.remove(name),
                    };
                }
            }
            Layout::Scalar => *record = value.unwrap_or(Value::Null),
        }
        Ok(())
    }

    fn validate_items(&self, items: &[Value]) -> EntityResult<()> {
        let mut seen = std::collections::HashSet::with_capacity(items.len());
        for item in items {
            let key = key_of(item)?;
            if !seen.insert(key) {
                return Err(EntityError::DuplicateValue(key.to_string()));
            }
        }
        Ok(())
    }

    fn replace_value(&mut self, index: usize, value: Value) -> EntityResult<()> {
        let new = key_of(&value)?.to_string();
        let Some(old) = self.key(index).map(str::to_string) else {
            return Ok(());
        };
        if old == new {
            return Ok(());
        }
        if self.model.contains_key(&new) {
            return Err(EntityError::DuplicateValue(new));
        }

        let layout = self.layout;
        self.model.entry(old.clone()).or_insert_with(|| layout.placeholder());
        self.handle_value_replace(&Value::String(old), &value);
        if let Some(slot) = self.state.items_mut().get_mut(index) {
            *slot = value;
        }
        self.sync_model();
        Ok(())
    }

    fn handle_value_replace(&mut self, old: &Value, new: &Value) {
        let (Some(old), Some(new)) = (old.as_str(), new.as_str()) else {
            return;
        };
        if let Some(record) = self.model.shift_remove(old) {
            self.model.insert(new.to_string(), record);
        }
    }

    fn delete_prop_values(&mut self, index: usize) {
        if let Some(key) = self.key(index).map(str::to_string) {
            self.model.shift_remove(&key);
        }
    }

    fn items_replaced(&mut self) {
        self.sync_model();
    }
}

/// A mapping index whose model values are the single declared prop.
#[derive(Debug)]
pub struct SimpleMappingIndex {
    inner: MappingIndex,
}

impl SimpleMappingIndex {
    /// Creates an index exposing each `model[key]` as `prop`.
    #[must_use]
    pub fn new(model: Model, prop: impl Into<String>) -> Self {
        Self {
            inner: MappingIndex::with_layout(model, vec![prop.into()], Layout::Scalar),
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

    /// Replaces the dictionary and rebuilds the items from its keys.
    pub fn set_model(&mut self, model: Model, notify: bool) {
        self.inner.set_model(model, notify);
    }
}

delegate_entity_index!(SimpleMappingIndex => inner);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityObject;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sites() -> MappingIndex {
        let model: Model = serde_json::from_value(json!({
            "foo": { "name": "Foo", "url": "http://hghwegwe" },
            "bar": { "name": "Bar", "url": "http://sdse42" },
            "barFoo": { "name": "BarFoo", "url": "http://www.wewerwe" }
        }))
        .unwrap();
        MappingIndex::new(model, vec!["name".into(), "url".into()])
    }

    fn site(index: usize, value: &str, name: &str, url: &str) -> EntityObject {
        EntityObject::at(index, value).prop("name", name).prop("url", url)
    }

    fn keys(index: &MappingIndex) -> Vec<&str> {
        index.model().keys().map(String::as_str).collect()
    }

    #[test]
    fn mapping_index() {
        let mut index = sites();

        assert_eq!(index.len(), 3);
        assert_eq!(index.all_indices(), &[0, 1, 2]);
        assert_eq!(index.entity_object(1), Some(site(1, "bar", "Bar", "http://sdse42")));

        index.set_entity_prop_value(1, "value", Some(json!("bars"))).unwrap();
        assert_eq!(index.entity_value(1), Some(&json!("bars")));
        assert_eq!(keys(&index), vec!["foo", "bars", "barFoo"]);
        assert_eq!(index.entity_object(1), Some(site(1, "bars", "Bar", "http://sdse42")));

        let appended = EntityObject::with_value("baba").prop("name", "Baba").prop("url", "empty");
        index.set_entity_object(appended, false).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.entity_object(3), Some(site(3, "baba", "Baba", "empty")));

        index.set_entity_object(site(1, "barbar", "Barbar", "empty"), false).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.entity_object(1), Some(site(1, "barbar", "Barbar", "empty")));
        assert_eq!(keys(&index), vec!["foo", "barbar", "bars", "barFoo", "baba"]);
    }

    #[test]
    fn rename_to_existing_key_is_rejected() {
        let mut index = sites();

        let err = index.set_entity_value(0, json!("bar")).unwrap_err();

        assert_eq!(err, EntityError::DuplicateValue("bar".into()));
        assert_eq!(keys(&index), vec!["foo", "bar", "barFoo"]);
    }

    #[test]
    fn overwrite_with_new_key_moves_record() {
        let mut index = sites();

        let object = EntityObject::at(0, "fooz").prop("name", "Fooz");
        index.set_entity_object(object, true).unwrap();

        assert_eq!(keys(&index), vec!["fooz", "bar", "barFoo"]);
        assert_eq!(index.entity_prop_value(0, "name"), Some(json!("Fooz")));
        assert_eq!(index.entity_prop_value(0, "url"), None);
    }

    #[test]
    fn delete_drops_model_entries() {
        let mut index = sites();

        index.delete_entities(&[0, 2]).unwrap();

        assert_eq!(keys(&index), vec!["bar"]);
        assert_eq!(index.entity_prop_value(0, "name"), Some(json!("Bar")));
    }

    #[test]
    fn non_string_keys_are_rejected() {
        let mut index = sites();

        let err = index.set_entity_object(EntityObject::with_value(3), false).unwrap_err();

        assert!(matches!(err, EntityError::InvalidValue(_)));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn simple_mapping_stores_scalars() {
        let model: Model = serde_json::from_value(json!({ "dev": "1", "prod": "2" })).unwrap();
        let mut index = SimpleMappingIndex::new(model, "overrideValue");

        assert_eq!(index.entity_prop_value(1, "overrideValue"), Some(json!("2")));

        index
            .set_entity_object(EntityObject::with_value("qa").prop("overrideValue", "3"), false)
            .unwrap();
        index.set_entity_value(0, json!("local")).unwrap();

        assert_eq!(
            index.model(),
            &serde_json::from_value::<Model>(json!({ "local": "1", "prod": "2", "qa": "3" })).unwrap()
        );
    }

    #[test]
    fn set_model_rebuilds_items() {
        let mut index = sites();
        let mut model = Model::new();
        model.insert("only".into(), json!({ "name": "Only" }));

        index.set_model(model, true);

        assert_eq!(index.items(), &[json!("only")]);
        assert_eq!(index.last_modified(), 1);
    }
}
