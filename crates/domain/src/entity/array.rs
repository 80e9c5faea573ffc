//! Plain value lists, optionally kept sorted.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use super::{EntityIndex, IndexState, ValueComparator};

/// An index whose entities are exactly its items.
pub struct ArrayIndex {
    state: IndexState,
    sorting: Option<Box<ValueComparator>>,
}

impl ArrayIndex {
    /// Wraps `items` in their given order.
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            state: IndexState::new(items),
            sorting: None,
        }
    }

    /// Sorts `items` with `compare` and keeps them sorted on upsert.
    #[must_use]
    pub fn sorted(mut items: Vec<Value>, compare: Box<ValueComparator>) -> Self {
        items.sort_by(|a, b| compare(a, b));
        Self {
            state: IndexState::new(items),
            sorting: Some(compare),
        }
    }
}

impl fmt::Debug for ArrayIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayIndex")
            .field("state", &self.state)
            .field("sorted", &self.sorting.is_some())
            .finish()
    }
}

impl EntityIndex for ArrayIndex {
    fn state(&self) -> &IndexState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut IndexState {
        &mut self.state
    }

    fn index_sorting(&self) -> Option<&ValueComparator> {
        self.sorting.as_deref()
    }
}

/// Ascending order: strings lexicographically, numbers numerically,
/// anything else by its JSON text.
#[must_use]
pub fn natural_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityObject;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn array_values() {
        let mut index = ArrayIndex::new(vec![json!("foo"), json!("bar"), json!("foobar")]);

        assert_eq!(index.len(), 3);
        assert!(index.has_index(0));
        assert!(index.has_index(2));
        assert!(!index.has_index(3));
        assert_eq!(index.entity_props(), vec!["index", "value"]);
        assert_eq!(index.all_indices(), &[0, 1, 2]);

        assert_eq!(index.entity_prop_value(0, "index"), Some(json!(0)));
        assert_eq!(index.entity_prop_value(0, "value"), Some(json!("foo")));
        assert_eq!(index.entity_object(1), Some(EntityObject::at(1, "bar")));
        assert_eq!(index.entity_by_prop_value("value", &json!("foobar")), Some(2));
        assert_eq!(index.entity_by_prop_value("value", &json!("nope")), None);
        assert_eq!(
            index.prop_values("index"),
            vec![Some(json!(0)), Some(json!(1)), Some(json!(2))]
        );
        assert_eq!(
            index.entity_objects(None),
            vec![
                EntityObject::at(0, "foo"),
                EntityObject::at(1, "bar"),
                EntityObject::at(2, "foobar"),
            ]
        );

        index.set_entity_value(1, json!("barbar")).unwrap();
        assert_eq!(index.entity_value(1), Some(&json!("barbar")));

        index.set_entity_object(EntityObject::with_value("new bar"), false).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.entity_object(3), Some(EntityObject::at(3, "new bar")));

        index.set_entity_object(EntityObject::at(0, "new start"), false).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.entity_object(0), Some(EntityObject::at(0, "new start")));

        index.set_entity_object(EntityObject::at(2, "bar"), true).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.entity_object(2), Some(EntityObject::at(2, "bar")));

        index.delete_entity(2).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.all_indices(), &[0, 1, 2, 3]);
        assert!(!index.has_prop_value("value", &json!("bar")));

        index.set_items(vec![json!("foo")]).unwrap();
        assert_eq!(index.all_indices(), &[0]);
    }

    #[test]
    fn sorted_array_values() {
        let mut index = ArrayIndex::sorted(
            vec![json!("foo"), json!("bar"), json!("foobar")],
            Box::new(natural_order),
        );

        assert_eq!(index.entity_value(0), Some(&json!("bar")));

        index.set_entity_object(EntityObject::with_value("aaa"), false).unwrap();
        assert_eq!(index.entity_by_prop_value("value", &json!("aaa")), Some(0));

        let moved = index.set_entity_object(EntityObject::at(0, "zzz"), true).unwrap();
        assert_eq!(moved, Some(3));
        assert_eq!(index.entity_by_prop_value("value", &json!("zzz")), Some(3));
        assert_eq!(index.entity_by_prop_value("value", &json!("bar")), Some(0));
    }

    #[test]
    fn natural_order_compares_numbers_numerically() {
        assert_eq!(natural_order(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(natural_order(&json!("b"), &json!("a")), Ordering::Greater);
    }
}
