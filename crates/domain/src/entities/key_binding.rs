//! Hot keys bound to UI actions.

use serde_json::Value;

use crate::entity::{EntityIndex, EntityResult, Model, SimpleMappingIndex, delegate_entity_index};

/// Action → hot key, e.g. `"send" → "c Enter"`.
///
/// A hot key is bound to at most one action; an empty string means unbound.
#[derive(Debug)]
pub struct KeyBindingIndex {
    inner: SimpleMappingIndex,
}

impl KeyBindingIndex {
    /// Name of the single declared property.
    pub const PROP: &'static str = "hotKey";

    /// Wraps a persisted binding model.
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

    /// Hot key of `action`, if bound.
    #[must_use]
    pub fn hot_key(&self, action: &str) -> Option<&str> {
        self.model()
            .get(action)
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
    }

    /// Action bound to `hot_key`.
    #[must_use]
    pub fn action_for(&self, hot_key: &str) -> Option<&str> {
        if hot_key.is_empty() {
            return None;
        }
        self.model()
            .iter()
            .find(|(_, key)| key.as_str() == Some(hot_key))
            .map(|(action, _)| action.as_str())
    }

    /// Binds `hot_key` to `action`, unbinding it from the action that held
    /// it before. Returns that action.
    ///
    /// # Errors
    ///
    /// Returns an error if a binding cannot be written.
    pub fn assign(&mut self, action: &str, hot_key: &str) -> EntityResult<Option<String>> {
        let previous = self
            .action_for(hot_key)
            .filter(|holder| *holder != action)
            .map(str::to_string);
        if let Some(holder) = &previous
            && let Some(index) = self.entity_by_prop_value("value", &Value::from(holder.as_str()))
        {
            self.set_entity_prop_value(index, Self::PROP, Some(Value::from("")))?;
        }

        match self.entity_by_prop_value("value", &Value::from(action)) {
            Some(index) => self.set_entity_prop_value(index, Self::PROP, Some(Value::from(hot_key)))?,
            None => {
                let object = crate::entity::EntityObject::with_value(action).prop(Self::PROP, hot_key);
                self.set_entity_object(object, false)?;
            }
        }
        Ok(previous)
    }

    /// Unbinds `action`; returns whether it was bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding cannot be written.
    pub fn unbind(&mut self, action: &str) -> EntityResult<bool> {
        if self.hot_key(action).is_none() {
            return Ok(false);
        }
        let Some(index) = self.entity_by_prop_value("value", &Value::from(action)) else {
            return Ok(false);
        };
        self.set_entity_prop_value(index, Self::PROP, Some(Value::from("")))?;
        Ok(true)
    }
}

delegate_entity_index!(KeyBindingIndex => inner);
