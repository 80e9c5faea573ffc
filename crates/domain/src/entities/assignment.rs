//! Request assignments.
//!
//! An assignment says how one query parameter, header or body field of a
//! request gets its value: set verbatim, left to the backend default,
//! dropped, taken from a constant, asked for when the request runs, or
//! extracted from the response of another request.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{EntityIndex, EntityObject, EntityResult, MappingIndex, Model, delegate_entity_index};

/// Where an assignment's value comes from. Stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentAction {
    /// The stored value.
    Set,
    /// Whatever the backend defaults to; nothing is sent.
    Default,
    /// Explicitly not sent.
    Ignore,
    /// The value of the constant the stored value names.
    Const,
    /// A value supplied when the request runs.
    Prompt,
    /// A value extracted from another request's response.
    Extract,
}

impl AssignmentAction {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Set => 1,
            Self::Default => 2,
            Self::Ignore => 3,
            Self::Const => 4,
            Self::Prompt => 5,
            Self::Extract => 6,
        }
    }

    /// The action with wire code `code`.
    #[must_use]
    pub const fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            1 => Self::Set,
            2 => Self::Default,
            3 => Self::Ignore,
            4 => Self::Const,
            5 => Self::Prompt,
            6 => Self::Extract,
            _ => return None,
        })
    }

    /// Reads a stored code.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_u64().and_then(Self::from_code)
    }
}

impl Serialize for AssignmentAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.code())
    }
}

impl From<AssignmentAction> for Value {
    fn from(action: AssignmentAction) -> Self {
        Self::from(action.code())
    }
}

/// How a set value is interpreted. Stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentType {
    /// Sent as text.
    String,
    /// Parsed as JSON.
    Json,
}

impl AssignmentType {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::String => 1,
            Self::Json => 2,
        }
    }

    /// Reads a stored code; anything unknown is text.
    #[must_use]
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_u64) {
            Some(2) => Self::Json,
            _ => Self::String,
        }
    }
}

impl From<AssignmentType> for Value {
    fn from(kind: AssignmentType) -> Self {
        Self::from(kind.code())
    }
}

/// The part of a request an assignment fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentTarget {
    /// Query parameters.
    Query,
    /// Headers.
    Headers,
    /// Top-level body fields.
    Body,
}

impl AssignmentTarget {
    /// Value types assignments of this target accept.
    #[must_use]
    pub const fn types(self) -> &'static [AssignmentType] {
        match self {
            Self::Headers => &[AssignmentType::String],
            Self::Query | Self::Body => &[AssignmentType::String, AssignmentType::Json],
        }
    }
}

/// Assignments of one request target, keyed by parameter name.
#[derive(Debug)]
pub struct AssignmentIndex {
    inner: MappingIndex,
    target: AssignmentTarget,
}

impl AssignmentIndex {
    /// Declared properties.
    pub const PROPS: [&'static str; 3] = ["action", "type", "assignmentValue"];

    /// Wraps the assignments of `target`.
    #[must_use]
    pub fn new(model: Model, target: AssignmentTarget) -> Self {
        let props = Self::PROPS.iter().map(ToString::to_string).collect();
        Self {
            inner: MappingIndex::new(model, props),
            target,
        }
    }

    /// Query parameter assignments.
    #[must_use]
    pub fn query(model: Model) -> Self {
        Self::new(model, AssignmentTarget::Query)
    }

    /// Header assignments.
    #[must_use]
    pub fn headers(model: Model) -> Self {
        Self::new(model, AssignmentTarget::Headers)
    }

    /// Body field assignments.
    #[must_use]
    pub fn body(model: Model) -> Self {
        Self::new(model, AssignmentTarget::Body)
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

    /// What the assignments fill in.
    #[must_use]
    pub const fn target(&self) -> AssignmentTarget {
        self.target
    }

    /// Whether assignments can choose between text and JSON.
    #[must_use]
    pub const fn has_multi_type(&self) -> bool {
        self.target.types().len() > 1
    }

    /// Action of the assignment at `index`.
    #[must_use]
    pub fn action(&self, index: usize) -> Option<AssignmentAction> {
        AssignmentAction::from_value(&self.entity_prop_value(index, "action")?)
    }

    /// Whether `value` is acceptable as a JSON value of this target. Query
    /// values must be empty or JSON other than `null`.
    #[must_use]
    pub fn accepts_value(&self, value: &str) -> bool {
        if self.target != AssignmentTarget::Query || value.is_empty() {
            return true;
        }
        serde_json::from_str::<Value>(value).is_ok_and(|parsed| !parsed.is_null())
    }

    /// Aligns the assignments with the parameters the backend declares.
    ///
    /// Keys matching a default case-insensitively take the default's
    /// spelling. `DEFAULT` assignments are dropped, and so are `IGNORE`
    /// assignments without a default to ignore. Every default then missing
    /// gets a `DEFAULT` assignment. Without `defaults` only the dropping
    /// happens.
    ///
    /// # Errors
    ///
    /// Returns an error if a respelled key collides with another assignment.
    pub fn sync_to_defaults(&mut self, defaults: Option<&Model>) -> EntityResult<()> {
        let spelling: HashMap<String, &String> = defaults
            .into_iter()
            .flat_map(|defaults| defaults.keys())
            .map(|key| (key.to_lowercase(), key))
            .collect();

        let mut stale = Vec::new();
        for index in 0..self.len() {
            let Some(key) = self.entity_value(index).and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            let default = spelling.get(&key.to_lowercase()).copied();
            if let Some(default) = default
                && *default != key
            {
                self.set_entity_prop_value(index, "value", Some(Value::from(default.as_str())))?;
            }
            match self.action(index) {
                Some(AssignmentAction::Default) => stale.push(index),
                Some(AssignmentAction::Ignore) if default.is_none() => stale.push(index),
                _ => {}
            }
        }
        if !stale.is_empty() {
            self.delete_entities(&stale)?;
        }

        let Some(defaults) = defaults else {
            return Ok(());
        };
        let present = self.extract_lc_props("value", None);
        let missing: Vec<EntityObject> = defaults
            .keys()
            .filter(|key| !present.contains(&key.to_lowercase()))
            .map(|key| {
                EntityObject::with_value(key.as_str())
                    .prop("action", AssignmentAction::Default)
                    .prop("type", AssignmentType::String)
                    .prop("assignmentValue", "")
            })
            .collect();
        if !missing.is_empty() {
            self.set_entity_objects(missing, false)?;
        }
        Ok(())
    }
}

delegate_entity_index!(AssignmentIndex => inner);

/// The assignments stored with a saved request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAssignments {
    /// Query parameter assignments.
    #[serde(default)]
    pub query: Model,
    /// Header assignments.
    #[serde(default)]
    pub headers: Model,
    /// Body field assignments.
    #[serde(default)]
    pub body: Model,
}

impl RequestAssignments {
    /// Whether no assignment is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.query.is_empty() && self.headers.is_empty() && self.body.is_empty()
    }

    /// The model of `target`.
    #[must_use]
    pub const fn model(&self, target: AssignmentTarget) -> &Model {
        match target {
            AssignmentTarget::Query => &self.query,
            AssignmentTarget::Headers => &self.headers,
            AssignmentTarget::Body => &self.body,
        }
    }

    /// Assignments of every target listed as `listing` asks.
    #[must_use]
    pub fn listed(&self, listing: AssignmentListing) -> Vec<(AssignmentTarget, ListedAssignment)> {
        [AssignmentTarget::Headers, AssignmentTarget::Query, AssignmentTarget::Body]
            .into_iter()
            .flat_map(|target| {
                listed_assignments(self.model(target), listing)
                    .into_iter()
                    .map(move |listed| (target, listed))
            })
            .collect()
    }
}

/// Which assignments [`listed_assignments`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentListing {
    /// None at all.
    Nothing,
    /// All but `DEFAULT` ones.
    #[default]
    NonDefault,
    /// Every one.
    All,
}

/// One assignment as reported by [`listed_assignments`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedAssignment {
    /// Parameter name.
    pub name: String,
    /// Action, if the stored code is known.
    pub action: Option<AssignmentAction>,
    /// Stored value.
    pub value: String,
}

/// Lists the assignments of `model` in order.
#[must_use]
pub fn listed_assignments(model: &Model, listing: AssignmentListing) -> Vec<ListedAssignment> {
    if listing == AssignmentListing::Nothing {
        return Vec::new();
    }
    model
        .iter()
        .filter_map(|(name, assignment)| {
            let action = assignment.get("action").and_then(AssignmentAction::from_value);
            if listing == AssignmentListing::NonDefault && action == Some(AssignmentAction::Default) {
                return None;
            }
            Some(ListedAssignment {
                name: name.clone(),
                action,
                value: stored_value(assignment),
            })
        })
        .collect()
}

fn stored_value(assignment: &Value) -> String {
    match assignment.get("assignmentValue") {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// What the `Content-Type` header assignment asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentTypeChoice {
    /// Send this content type.
    Explicit(String),
    /// Let the client pick.
    ClientDefault,
    /// Send the body as given, without a content type.
    Raw,
}

/// Reads the choice of the first `Content-Type` header assignment, matched
/// case-insensitively. `None` if there is none or its action makes no
/// choice.
#[must_use]
pub fn content_type_choice(headers: &Model) -> Option<ContentTypeChoice> {
    let (_, assignment) = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))?;
    match assignment.get("action").and_then(AssignmentAction::from_value)? {
        AssignmentAction::Set => Some(ContentTypeChoice::Explicit(stored_value(assignment))),
        AssignmentAction::Default => Some(ContentTypeChoice::ClientDefault),
        AssignmentAction::Ignore => Some(ContentTypeChoice::Raw),
        _ => None,
    }
}

/// Normalizes a JSON query value to strings: numbers and booleans become
/// text, `null` disappears, empty objects disappear and empty arrays become
/// `[""]`.
#[must_use]
pub fn normalize_query(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(_) => Some(value.clone()),
        Value::Number(number) => Some(Value::String(number.to_string())),
        Value::Bool(flag) => Some(Value::String(flag.to_string())),
        Value::Array(items) => {
            let items: Vec<Value> = items.iter().filter_map(normalize_query).collect();
            if items.is_empty() {
                Some(Value::Array(vec![Value::String(String::new())]))
            } else {
                Some(Value::Array(items))
            }
        }
        Value::Object(fields) => {
            let fields: serde_json::Map<String, Value> = fields
                .iter()
                .filter_map(|(key, value)| Some((key.clone(), normalize_query(value)?)))
                .collect();
            (!fields.is_empty()).then_some(Value::Object(fields))
        }
    }
}

/// The source of an `EXTRACT` assignment: `"<request> <code> <from> <path>"`,
/// where `path` is a JSON array of keys and indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSource {
    /// Key of the saved request to run.
    pub request: String,
    /// Response code the value is extracted from.
    pub code: u16,
    /// Part of the response to read.
    pub from: String,
    /// JSON array of keys and indices.
    pub path: String,
}

impl ExtractSource {
    /// Splits a stored value; missing parts take their defaults.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut parts = value.splitn(4, ' ');
        let mut next = |default: &str| parts.next().map_or_else(|| default.to_string(), str::to_string);
        let request = next("");
        let code = next("200").parse().unwrap_or(200);
        let from = next("");
        let path = next("[]");
        Self {
            request,
            code,
            from,
            path,
        }
    }

    /// Human readable path, e.g. `body → "items" → 0`.
    #[must_use]
    pub fn describe_path(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.from.is_empty() {
            parts.push(self.from.clone());
        }
        if let Ok(Value::Array(steps)) = serde_json::from_str::<Value>(&self.path) {
            parts.extend(steps.iter().map(Value::to_string));
        }
        parts.join(" → ")
    }
}
