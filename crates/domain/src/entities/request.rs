//! Saved requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RequestAssignments;
use crate::entity::{EntityIndex, MappingIndex, Model, delegate_entity_index};

/// What a saved request sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRequest {
    /// HTTP method.
    #[serde(default = "get")]
    pub method: String,
    /// Path appended to the base URL.
    #[serde(default)]
    pub path: String,
    /// Request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn get() -> String {
    "GET".to_string()
}

/// Saved requests keyed by a generated id; searchable by name.
#[derive(Debug)]
pub struct RequestIndex {
    inner: MappingIndex,
}

impl RequestIndex {
    /// Declared properties.
    pub const PROPS: [&'static str; 4] = ["name", "folder", "request", "assignments"];

    /// Wraps a persisted request model.
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

    /// The request stored under `key`, or else the first one named `key`.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<usize> {
        let key = Value::from(key);
        self.entity_by_prop_value("value", &key)
            .or_else(|| self.entity_by_prop_value("name", &key))
    }

    /// What the request at `index` sends; `None` if it is malformed.
    #[must_use]
    pub fn saved_request(&self, index: usize) -> Option<SavedRequest> {
        serde_json::from_value(self.entity_prop_value(index, "request")?).ok()
    }

    /// Assignments of the request at `index`; empty if none are stored.
    #[must_use]
    pub fn assignments(&self, index: usize) -> RequestAssignments {
        self.entity_prop_value(index, "assignments")
            .and_then(|assignments| serde_json::from_value(assignments).ok())
            .unwrap_or_default()
    }
}

delegate_entity_index!(RequestIndex => inner);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityIndex, ViewOptions};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn text_filter_matches_names_case_insensitively() {
        let model: Model = serde_json::from_value(json!({
            "r1": { "name": "List users", "request": { "path": "/users" } },
            "r2": { "name": "Create order", "request": { "path": "/orders" } },
            "r3": { "name": "Delete USER", "request": { "path": "/users/1" } }
        }))
        .unwrap();
        let index = RequestIndex::new(model);

        let view = index.view(&ViewOptions::new().filter("user"));

        assert_eq!(view.matches, vec![0, 2]);
        assert_eq!(view.count, 2);
        assert!(view.is_filtered);
    }

    #[test]
    fn saved_requests_are_found_by_key_or_name() {
        let model: Model = serde_json::from_value(json!({
            "r1": {
                "name": "Search",
                "request": { "method": "POST", "path": "/search", "body": "{}" },
                "assignments": { "query": { "page": { "action": 1, "type": 1, "assignmentValue": "2" } } }
            },
            "r2": { "name": "Broken", "request": 7 }
        }))
        .unwrap();
        let index = RequestIndex::new(model);

        assert_eq!(index.find("r1"), Some(0));
        assert_eq!(index.find("Broken"), Some(1));
        assert_eq!(index.find("missing"), None);
        assert_eq!(
            index.saved_request(0),
            Some(SavedRequest {
                method: "POST".into(),
                path: "/search".into(),
                body: Some("{}".into())
            })
        );
        assert_eq!(index.saved_request(1), None);
        assert_eq!(index.assignments(0).query.len(), 1);
        assert!(index.assignments(1).is_empty());
    }
}
