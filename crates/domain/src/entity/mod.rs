//! Observable entity collections.
//!
//! An [`EntityIndex`] is an ordered collection of entities addressed by
//! position. Entities have no stored identity: every property is derived on
//! demand from the position, so indices must be re-resolved after any
//! structural mutation (insert, delete, reorder).
//!
//! All mutations are synchronous. Multi-step operations suspend notifications
//! and fire exactly one notification when they complete, so listeners never
//! observe a partially applied batch.

mod array;
mod mapping;
mod record;
mod state;
mod upsert;
mod view;

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use array::{ArrayIndex, natural_order};
pub use mapping::{MappingIndex, Model, SimpleMappingIndex};
pub use record::RecordIndex;
pub use state::{IndexState, ListenerId, Update, UpdateKind};
pub use view::{View, ViewOptions};

/// Name of the positional property every entity exposes.
pub const INDEX_PROP: &str = "index";

/// Name of the value property every entity exposes.
pub const VALUE_PROP: &str = "value";

/// A path into an entity property, e.g. `["request", "path"]`.
pub type PropPath = Vec<String>;

/// Comparator used by indices that keep their items sorted.
pub type ValueComparator = dyn Fn(&Value, &Value) -> Ordering + Send + Sync;

/// Errors raised by entity index mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// The addressed position does not exist.
    #[error("index {index} is out of range for length {length}")]
    IndexOutOfRange {
        /// The requested position.
        index: usize,
        /// The collection length at the time of the call.
        length: usize,
    },

    /// The property is not declared by this index.
    #[error("unknown entity property: {0}")]
    UnknownProp(String),

    /// The value would appear twice in an index requiring unique values.
    #[error("duplicate entity value: {0}")]
    DuplicateValue(String),

    /// The value cannot be stored by this index.
    #[error("invalid entity value: {0}")]
    InvalidValue(String),
}

/// Result type alias for entity index operations.
pub type EntityResult<T> = Result<T, EntityError>;

/// A property name resolved against the built-in properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prop<'a> {
    /// The entity position.
    Index,
    /// The item stored at the position.
    Value,
    /// A property declared by the index subtype.
    Field(&'a str),
}

impl<'a> Prop<'a> {
    /// Resolves a property name.
    #[must_use]
    pub fn parse(name: &'a str) -> Self {
        match name {
            INDEX_PROP => Self::Index,
            VALUE_PROP => Self::Value,
            other => Self::Field(other),
        }
    }
}

/// A projection of an entity, or the input of an upsert.
///
/// On input, `index` and `value` select the upsert operation:
/// an `index` addresses an existing position (updated with `overwrite`,
/// inserted before otherwise), a sole `value` appends, and neither is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityObject {
    /// Position of the entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Item stored at the position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Declared properties.
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

impl EntityObject {
    /// Creates an object carrying only a value (appends on upsert).
    #[must_use]
    pub fn with_value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Creates an object addressing a position.
    #[must_use]
    pub fn at(index: usize, value: impl Into<Value>) -> Self {
        Self {
            index: Some(index),
            value: Some(value.into()),
            props: Map::new(),
        }
    }

    /// Sets a declared property.
    #[must_use]
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Returns the value of any property, built-in or declared.
    #[must_use]
    pub fn get(&self, prop: &str) -> Option<Value> {
        match Prop::parse(prop) {
            Prop::Index => self.index.map(Value::from),
            Prop::Value => self.value.clone(),
            Prop::Field(name) => self.props.get(name).cloned(),
        }
    }
}

/// An ordered, observable collection of positional entities.
///
/// Implementors provide the shared [`IndexState`] and override the hooks
/// below; every read and write operation is provided on top of them.
pub trait EntityIndex {
    /// Shared state: items, listeners and the pending update log.
    fn state(&self) -> &IndexState;

    /// Mutable access to the shared state.
    fn state_mut(&mut self) -> &mut IndexState;

    /// Properties declared on top of `index` and `value`.
    fn field_props(&self) -> &[String] {
        &[]
    }

    /// Derived properties that are recomputed instead of copied on upsert.
    fn auto_props(&self) -> &[String] {
        &[]
    }

    /// Property paths searched by a text filter.
    fn filter_props(&self) -> &[PropPath] {
        &[]
    }

    /// Whether the value of an entity is its own position.
    fn value_indexing(&self) -> bool {
        false
    }

    /// Comparator keeping items sorted on structural inserts.
    fn index_sorting(&self) -> Option<&ValueComparator> {
        None
    }

    /// Whether values are unique; lookups by value assume they are.
    fn has_unique_values(&self) -> bool {
        true
    }

    /// Reads a declared property from the backing storage.
    fn field_value(&self, _index: usize, _name: &str) -> Option<Value> {
        None
    }

    /// Writes a declared property; `None` removes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the property cannot be stored.
    fn write_field(&mut self, _index: usize, name: &str, _value: Option<Value>) -> EntityResult<()> {
        Err(EntityError::UnknownProp(name.to_string()))
    }

    /// Checks a complete item list before it is committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the items violate the subtype's constraints.
    fn validate_items(&self, _items: &[Value]) -> EntityResult<()> {
        Ok(())
    }

    /// Stores a new value at an existing position.
    ///
    /// # Errors
    ///
    /// Returns an error if the subtype rejects the value.
    fn replace_value(&mut self, index: usize, value: Value) -> EntityResult<()> {
        if let Some(slot) = self.state_mut().items_mut().get_mut(index) {
            *slot = value;
        }
        Ok(())
    }

    /// Called when an upsert replaced `old` by `new` and `old` is gone.
    fn handle_value_replace(&mut self, _old: &Value, _new: &Value) {}

    /// Called for every entity removed by a delete, before compaction.
    fn delete_prop_values(&mut self, _index: usize) {}

    /// Called after the item list was replaced.
    fn items_replaced(&mut self) {}

    /// Recomputes auto properties; returns the props to copy afterwards.
    fn assign_auto_props(&mut self, _indices: &[usize]) -> Vec<String> {
        Vec::new()
    }

    /// Number of entities.
    fn len(&self) -> usize {
        self.state().items().len()
    }

    /// Whether the index holds no entities.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Revision counter, bumped on every mutation.
    fn last_modified(&self) -> u64 {
        self.state().last_modified()
    }

    /// The ordered items.
    fn items(&self) -> &[Value] {
        self.state().items()
    }

    /// Whether `index` addresses an entity.
    fn has_index(&self, index: usize) -> bool {
        index < self.len()
    }

    /// `[0, len)`, memoized until the next notification.
    fn all_indices(&self) -> &[usize] {
        self.state().all_indices()
    }

    /// All recognized property names, built-ins first.
    fn entity_props(&self) -> Vec<String> {
        let mut props = vec![INDEX_PROP.to_string(), VALUE_PROP.to_string()];
        props.extend(self.field_props().iter().cloned());
        props
    }

    /// Whether `name` is a recognized property.
    fn has_entity_prop(&self, name: &str) -> bool {
        matches!(Prop::parse(name), Prop::Index | Prop::Value)
            || self.field_props().iter().any(|p| p == name)
    }

    /// Whether entities carry dimensional properties.
    fn has_entity_dim(&self) -> bool {
        self.has_entity_prop("width")
    }

    /// The item at `index`.
    fn entity_value(&self, index: usize) -> Option<&Value> {
        self.items().get(index)
    }

    /// Derives a property of the entity at `index`.
    fn entity_prop_value(&self, index: usize, prop: &str) -> Option<Value> {
        if !self.has_index(index) {
            return None;
        }
        match Prop::parse(prop) {
            Prop::Index => Some(Value::from(index)),
            Prop::Value => self.entity_value(index).cloned(),
            Prop::Field(name) if self.has_entity_prop(name) => self.field_value(index, name),
            Prop::Field(_) => None,
        }
    }

    /// Projects the entity at `index` with all properties.
    fn entity_object(&self, index: usize) -> Option<EntityObject> {
        let props = self.entity_props();
        let props: Vec<&str> = props.iter().map(String::as_str).collect();
        self.entity_object_with(index, &props)
    }

    /// Projects the entity at `index` with the requested properties.
    fn entity_object_with(&self, index: usize, props: &[&str]) -> Option<EntityObject> {
        if !self.has_index(index) {
            return None;
        }
        let mut object = EntityObject::default();
        for prop in props {
            match Prop::parse(prop) {
                Prop::Index => object.index = Some(index),
                Prop::Value => object.value = self.entity_value(index).cloned(),
                Prop::Field(name) => {
                    if let Some(value) = self.entity_prop_value(index, name) {
                        object.props.insert(name.to_string(), value);
                    }
                }
            }
        }
        Some(object)
    }

    /// Projects several entities, or all of them.
    fn entity_objects(&self, indices: Option<&[usize]>) -> Vec<EntityObject> {
        indices
            .unwrap_or_else(|| self.all_indices())
            .iter()
            .filter_map(|&index| self.entity_object(index))
            .collect()
    }

    /// First entity whose property equals `value`.
    fn entity_by_prop_value(&self, prop: &str, value: &Value) -> Option<usize> {
        (0..self.len()).find(|&index| self.entity_prop_value(index, prop).as_ref() == Some(value))
    }

    /// All entities whose property equals `value`.
    fn entities_by_prop_value(&self, prop: &str, value: &Value) -> Vec<usize> {
        (0..self.len())
            .filter(|&index| self.entity_prop_value(index, prop).as_ref() == Some(value))
            .collect()
    }

    /// Whether any entity has a defined property value accepted by `matcher`.
    fn has_prop_value_match(&self, prop: &str, matcher: &dyn Fn(&Value) -> bool) -> bool {
        self.all_indices()
            .iter()
            .filter_map(|&index| self.entity_prop_value(index, prop))
            .any(|value| matcher(&value))
    }

    /// Whether any entity has the property value.
    fn has_prop_value(&self, prop: &str, value: &Value) -> bool {
        self.has_prop_value_match(prop, &|candidate| candidate == value)
    }

    /// The property of every entity, in order.
    fn prop_values(&self, prop: &str) -> Vec<Option<Value>> {
        self.all_indices()
            .iter()
            .map(|&index| self.entity_prop_value(index, prop))
            .collect()
    }

    /// Filters `indices` (default: all) by `matcher` (default: accept all).
    fn matching_entities(
        &self,
        matcher: Option<&dyn Fn(usize) -> bool>,
        indices: Option<&[usize]>,
    ) -> Vec<usize> {
        indices
            .unwrap_or_else(|| self.all_indices())
            .iter()
            .copied()
            .filter(|&index| matcher.is_none_or(|matches| matches(index)))
            .collect()
    }

    /// A filtered, sorted and paged projection of the current indices.
    fn view(&self, options: &ViewOptions<'_>) -> View {
        view::build(self, options)
    }

    /// Lower-cased string values of `prop`, skipping the entity whose value
    /// is `exclude`.
    fn extract_lc_props(&self, prop: &str, exclude: Option<&Value>) -> BTreeSet<String> {
        (0..self.len())
            .filter(|&index| exclude.is_none_or(|excluded| self.entity_value(index) != Some(excluded)))
            .filter_map(|index| self.entity_prop_value(index, prop))
            .filter_map(|value| value.as_str().map(str::to_lowercase))
            .collect()
    }

    /// Registers a change listener.
    fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&[Update]) + Send + 'static,
        Self: Sized,
    {
        self.state_mut().add_listener(Box::new(listener))
    }

    /// Unregisters a change listener; returns whether it was registered.
    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.state_mut().remove_listener(id)
    }

    /// Bumps the revision and, unless suspended, delivers pending updates.
    fn notify(&mut self) {
        self.state_mut().notify();
    }

    /// Replaces all items.
    ///
    /// # Errors
    ///
    /// Returns an error if the subtype rejects the items.
    fn set_items(&mut self, items: Vec<Value>) -> EntityResult<()> {
        self.validate_items(&items)?;
        self.state_mut().replace_items(items);
        self.items_replaced();
        self.notify();
        Ok(())
    }

    /// Stores a new value at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range or the value is rejected.
    fn set_entity_value(&mut self, index: usize, value: Value) -> EntityResult<()> {
        self.check_index(index)?;
        self.replace_value(index, value.clone())?;
        self.state_mut().push_update(Update::update(index, Some(value)));
        self.notify();
        Ok(())
    }

    /// Writes one property. `index` is positional and never written.
    ///
    /// # Errors
    ///
    /// Returns an error for out-of-range positions or undeclared properties.
    fn set_entity_prop_value(&mut self, index: usize, prop: &str, value: Option<Value>) -> EntityResult<()> {
        match Prop::parse(prop) {
            Prop::Index => Ok(()),
            Prop::Value => match value {
                Some(value) => self.set_entity_value(index, value),
                None => Ok(()),
            },
            Prop::Field(name) => {
                if !self.has_entity_prop(name) {
                    return Err(EntityError::UnknownProp(name.to_string()));
                }
                self.check_index(index)?;
                self.write_field(index, name, value)?;
                let current = self.entity_value(index).cloned();
                self.state_mut().push_update(Update::update(index, current));
                self.notify();
                Ok(())
            }
        }
    }

    /// Upserts one object; returns its final position.
    ///
    /// # Errors
    ///
    /// See [`EntityIndex::set_entity_objects`].
    fn set_entity_object(&mut self, object: EntityObject, overwrite: bool) -> EntityResult<Option<usize>> {
        Ok(self
            .set_entity_objects(vec![object], overwrite)?
            .into_iter()
            .next()
            .flatten())
    }

    /// Upserts a batch of objects with a single notification.
    ///
    /// Returns the final position of every object, or `None` for objects
    /// carrying neither `index` nor `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if an overwrite addresses a missing position or the
    /// resulting items are rejected. Nothing is mutated in that case.
    fn set_entity_objects(&mut self, objects: Vec<EntityObject>, overwrite: bool) -> EntityResult<Vec<Option<usize>>> {
        upsert::apply(self, objects, overwrite)
    }

    /// Deletes the entity at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range.
    fn delete_entity(&mut self, index: usize) -> EntityResult<()> {
        self.delete_entities(&[index])
    }

    /// Deletes several entities and compacts the remaining ones.
    ///
    /// # Errors
    ///
    /// Returns an error if any index is out of range. Nothing is deleted then.
    fn delete_entities(&mut self, indices: &[usize]) -> EntityResult<()> {
        upsert::delete(self, indices)
    }

    /// Fails unless `index` addresses an entity.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::IndexOutOfRange`].
    fn check_index(&self, index: usize) -> EntityResult<()> {
        if self.has_index(index) {
            Ok(())
        } else {
            Err(EntityError::IndexOutOfRange {
                index,
                length: self.len(),
            })
        }
    }
}

/// Implements [`EntityIndex`] for a wrapper by forwarding every hook to one
/// of its fields.
macro_rules! delegate_entity_index {
    ($outer:ty => $field:ident) => {
        impl $crate::entity::EntityIndex for $outer {
            fn state(&self) -> &$crate::entity::IndexState {
                $crate::entity::EntityIndex::state(&self.$field)
            }

            fn state_mut(&mut self) -> &mut $crate::entity::IndexState {
                $crate::entity::EntityIndex::state_mut(&mut self.$field)
            }

            fn field_props(&self) -> &[String] {
                $crate::entity::EntityIndex::field_props(&self.$field)
            }

            fn auto_props(&self) -> &[String] {
                $crate::entity::EntityIndex::auto_props(&self.$field)
            }

            fn filter_props(&self) -> &[$crate::entity::PropPath] {
                $crate::entity::EntityIndex::filter_props(&self.$field)
            }

            fn value_indexing(&self) -> bool {
                $crate::entity::EntityIndex::value_indexing(&self.$field)
            }

            fn index_sorting(&self) -> Option<&$crate::entity::ValueComparator> {
                $crate::entity::EntityIndex::index_sorting(&self.$field)
            }

            fn field_value(&self, index: usize, name: &str) -> Option<serde_json::Value> {
                $crate::entity::EntityIndex::field_value(&self.$field, index, name)
            }

            fn write_field(
                &mut self,
                index: usize,
                name: &str,
                value: Option<serde_json::Value>,
            ) -> $crate::entity::EntityResult<()> {
                $crate::entity::EntityIndex::write_field(&mut self.$field, index, name, value)
            }

            fn validate_items(&self, items: &[serde_json::Value]) -> $crate::entity::EntityResult<()> {
                $crate::entity::EntityIndex::validate_items(&self.$field, items)
            }

            fn replace_value(
                &mut self,
                index: usize,
                value: serde_json::Value,
            ) -> $crate::entity::EntityResult<()> {
                $crate::entity::EntityIndex::replace_value(&mut self.$field, index, value)
            }

            fn handle_value_replace(&mut self, old: &serde_json::Value, new: &serde_json::Value) {
                $crate::entity::EntityIndex::handle_value_replace(&mut self.$field, old, new);
            }

            fn delete_prop_values(&mut self, index: usize) {
                $crate::entity::EntityIndex::delete_prop_values(&mut self.$field, index);
            }

            fn items_replaced(&mut self) {
                $crate::entity::EntityIndex::items_replaced(&mut self.$field);
            }

            fn assign_auto_props(&mut self, indices: &[usize]) -> Vec<String> {
                $crate::entity::EntityIndex::assign_auto_props(&mut self.$field, indices)
            }
        }
    };
}

pub(crate) use delegate_entity_index;
