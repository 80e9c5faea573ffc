//! Ordered lists of property records.

use serde_json::{Map, Value};

use super::{EntityIndex, EntityResult, IndexState, PropPath};

/// An index of records whose value is their own position.
#[derive(Debug, Default)]
pub struct RecordIndex {
    state: IndexState,
    records: Vec<Map<String, Value>>,
    props: Vec<String>,
    filter_props: Vec<PropPath>,
}

impl RecordIndex {
    /// Creates an index over `records` exposing `props`.
    #[must_use]
    pub fn new(records: Vec<Map<String, Value>>, props: Vec<String>) -> Self {
        let items = (0..records.len()).map(Value::from).collect();
        Self {
            state: IndexState::new(items),
            records,
            props,
            filter_props: Vec::new(),
        }
    }

    /// Sets the property paths searched by text filters.
    #[must_use]
    pub fn with_filter_props(mut self, filter_props: Vec<PropPath>) -> Self {
        self.filter_props = filter_props;
        self
    }

    /// The backing records in order.
    #[must_use]
    pub fn records(&self) -> &[Map<String, Value>] {
        &self.records
    }
}

impl EntityIndex for RecordIndex {
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

    fn value_indexing(&self) -> bool {
        true
    }

    fn field_value(&self, index: usize, name: &str) -> Option<Value> {
        self.records.get(index)?.get(name).cloned()
    }

    fn write_field(&mut self, index: usize, name: &str, value: Option<Value>) -> EntityResult<()> {
        if let Some(record) = self.records.get_mut(index) {
            match value {
                Some(value) => record.insert(name.to_string(), value),
                None => record.remove(name),
            };
        }
        Ok(())
    }

    fn delete_prop_values(&mut self, index: usize) {
        if let Some(record) = self.records.get_mut(index) {
            record.clear();
        }
    }

    fn items_replaced(&mut self) {
        let length = self.state.items().len();
        self.records.resize_with(length, Map::new);
    }
}
