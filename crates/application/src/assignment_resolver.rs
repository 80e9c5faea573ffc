//! Assignment resolution
//!
//! Turns the assignments of a saved request into the query parameters,
//! headers and body fields actually sent. `{{constant}}` references in set
//! values are resolved like the rest of the request.

use apixt_domain::{
    AssignmentAction, AssignmentTarget, AssignmentType, ConstantIndex, ContentTypeChoice, EntityIndex,
    ExtractSource, Model, RequestAssignments, entities::content_type_choice, entities::normalize_query,
};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::variable_resolver::VariableResolver;

/// What the assignments of a request resolve to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedAssignments {
    /// Query parameters, repeated for array values.
    pub query: Vec<(String, String)>,
    /// Headers.
    pub headers: Vec<(String, String)>,
    /// Top-level body fields.
    pub body: Map<String, Value>,
    /// Choice made by the `Content-Type` assignment.
    #[serde(skip)]
    pub content_type: Option<ContentTypeChoice>,
    /// Constants referenced but not defined.
    pub unresolved: Vec<String>,
    /// Assignments that could not be given a value, with the reason.
    pub skipped: Vec<String>,
}

/// Resolves assignments against the constants of one API environment and
/// the prompt answers given for the run.
pub struct AssignmentResolver<'a> {
    constants: &'a ConstantIndex,
    env: Option<&'a str>,
    variables: VariableResolver,
    prompts: &'a IndexMap<String, String>,
}

impl<'a> AssignmentResolver<'a> {
    /// Creates a resolver for `env`.
    #[must_use]
    pub fn new(constants: &'a ConstantIndex, env: Option<&'a str>, prompts: &'a IndexMap<String, String>) -> Self {
        Self {
            constants,
            env,
            variables: VariableResolver::for_env(constants, env),
            prompts,
        }
    }

    /// Resolves every assignment of `assignments`.
    #[must_use]
    pub fn resolve(&self, assignments: &RequestAssignments) -> ResolvedAssignments {
        let mut resolved = ResolvedAssignments {
            content_type: content_type_choice(&assignments.headers),
            ..ResolvedAssignments::default()
        };

        for target in [AssignmentTarget::Query, AssignmentTarget::Headers, AssignmentTarget::Body] {
            for (name, value) in self.values(target, assignments.model(target), &mut resolved) {
                match target {
                    AssignmentTarget::Query => push_query(&mut resolved.query, &name, &value),
                    AssignmentTarget::Headers => resolved.headers.push((name, text(value))),
                    AssignmentTarget::Body => {
                        resolved.body.insert(name, value);
                    }
                }
            }
        }
        resolved
    }

    fn values(&self, target: AssignmentTarget, model: &Model, resolved: &mut ResolvedAssignments) -> Vec<(String, Value)> {
        let mut values = Vec::new();
        for (name, assignment) in model {
            let stored = assignment
                .get("assignmentValue")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let Some(action) = assignment.get("action").and_then(AssignmentAction::from_value) else {
                resolved.skipped.push(format!("{} {name:?}: unknown action", label(target)));
                continue;
            };

            let value = match action {
                AssignmentAction::Default | AssignmentAction::Ignore => continue,
                AssignmentAction::Set => {
                    let result = self.variables.resolve(stored);
                    for missing in result.unresolved {
                        if !resolved.unresolved.contains(&missing) {
                            resolved.unresolved.push(missing);
                        }
                    }
                    match AssignmentType::from_value(assignment.get("type")) {
                        AssignmentType::String => Value::String(result.resolved),
                        AssignmentType::Json if target == AssignmentTarget::Headers => Value::String(result.resolved),
                        AssignmentType::Json => {
                            if let Ok(value) = serde_json::from_str(&result.resolved) {
                                value
                            } else {
                                resolved
                                    .skipped
                                    .push(format!("{} {name:?}: invalid JSON", label(target)));
                                continue;
                            }
                        }
                    }
                }
                AssignmentAction::Const => {
                    if let Some(value) = self.constant(stored) {
                        Value::String(value)
                    } else {
                        if !resolved.unresolved.iter().any(|known| known == stored) {
                            resolved.unresolved.push(stored.to_string());
                        }
                        continue;
                    }
                }
                AssignmentAction::Prompt => {
                    if let Some(answer) = self.prompts.get(name) {
                        Value::String(answer.clone())
                    } else {
                        resolved
                            .skipped
                            .push(format!("{} {name:?}: no answer to the prompt", label(target)));
                        continue;
                    }
                }
                AssignmentAction::Extract => {
                    let source = ExtractSource::parse(stored);
                    resolved.skipped.push(format!(
                        "{} {name:?}: extracted from request {:?} ({}) is not supported here",
                        label(target),
                        source.request,
                        source.describe_path()
                    ));
                    continue;
                }
            };
            values.push((name.clone(), value));
        }
        values
    }

    /// Value of the constant stored under `key`, or else named `key`.
    fn constant(&self, key: &str) -> Option<String> {
        let index = self
            .constants
            .entity_by_prop_value("value", &Value::from(key))
            .or_else(|| self.constants.entity_by_prop_value("name", &Value::from(key)))?;
        self.constants.effective_value(index, self.env)
    }
}

const fn label(target: AssignmentTarget) -> &'static str {
    match target {
        AssignmentTarget::Query => "query parameter",
        AssignmentTarget::Headers => "header",
        AssignmentTarget::Body => "body field",
    }
}

fn text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn push_query(query: &mut Vec<(String, String)>, name: &str, value: &Value) {
    match normalize_query(value) {
        None => {}
        Some(Value::Array(items)) => {
            query.extend(items.into_iter().map(|item| (name.to_string(), text(item))));
        }
        Some(value) => query.push((name.to_string(), text(value))),
    }
}

/// Merges resolved body fields into a request body. Without a body the
/// fields form a JSON object; a JSON object body takes the fields over its
/// own. Any other body is returned unchanged with `false`.
#[must_use]
pub fn merge_body(body: Option<&str>, fields: &Map<String, Value>) -> (Option<String>, bool) {
    if fields.is_empty() {
        return (body.map(str::to_string), true);
    }
    let mut object = match body.map(str::trim) {
        None | Some("") => Map::new(),
        Some(body) => match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(object)) => object,
            _ => return (Some(body.to_string()), false),
        },
    };
    object.extend(fields.iter().map(|(key, value)| (key.clone(), value.clone())));
    (Some(Value::Object(object).to_string()), true)
}
