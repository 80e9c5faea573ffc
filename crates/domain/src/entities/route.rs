//! Routes announced by the backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{EntityIndex, RecordIndex, delegate_entity_index};

/// A backend route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Path template, e.g. `/users/{id}`.
    pub path: String,
    /// Accepted HTTP methods.
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Routes in announcement order; the value of a route is its position.
#[derive(Debug)]
pub struct RouteIndex {
    inner: RecordIndex,
}

impl RouteIndex {
    /// Declared properties.
    pub const PROPS: [&'static str; 2] = ["path", "methods"];

    /// Indexes `routes` in order.
    #[must_use]
    pub fn new(routes: Vec<Route>) -> Self {
        let records = routes.into_iter().map(record).collect();
        let props = Self::PROPS.iter().map(ToString::to_string).collect();
        Self {
            inner: RecordIndex::new(records, props).with_filter_props(vec![vec!["path".to_string()]]),
        }
    }

    /// The route at `index`.
    #[must_use]
    pub fn route(&self, index: usize) -> Option<Route> {
        let path = self.entity_prop_value(index, "path")?.as_str()?.to_string();
        let methods = self
            .entity_prop_value(index, "methods")
            .and_then(|methods| serde_json::from_value(methods).ok())
            .unwrap_or_default();
        Some(Route { path, methods })
    }

    /// Routes whose path is exactly `path`.
    #[must_use]
    pub fn find_path(&self, path: &str) -> Option<usize> {
        self.entity_by_prop_value("path", &Value::from(path))
    }
}

fn record(route: Route) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("path".to_string(), Value::String(route.path));
    record.insert(
        "methods".to_string(),
        Value::Array(route.methods.into_iter().map(Value::String).collect()),
    );
    record
}

delegate_entity_index!(RouteIndex => inner);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ViewOptions;
    use pretty_assertions::assert_eq;

    fn route(path: &str, methods: &[&str]) -> Route {
        Route {
            path: path.to_string(),
            methods: methods.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn routes_are_paged_and_filtered() {
        let index = RouteIndex::new(vec![
            route("/users", &["GET", "POST"]),
            route("/users/{id}", &["GET"]),
            route("/orders", &["GET"]),
        ]);

        assert_eq!(index.route(1), Some(route("/users/{id}", &["GET"])));
        assert_eq!(index.find_path("/orders"), Some(2));

        let view = index.view(&ViewOptions::new().filter("USERS").length(1).page(2));
        assert_eq!(view.matches, vec![1]);
        assert_eq!(view.count, 2);
        assert_eq!(view.pages, 2);
    }

    #[test]
    fn deleting_a_route_renumbers_the_rest() {
        let mut index = RouteIndex::new(vec![route("/a", &[]), route("/b", &["PUT"])]);

        index.delete_entity(0).unwrap();

        assert_eq!(index.entity_value(0), Some(&Value::from(0)));
        assert_eq!(index.route(0), Some(route("/b", &["PUT"])));
    }
}
