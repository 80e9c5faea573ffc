//! Constant resolution engine

use indexmap::IndexMap;

use apixt_domain::ConstantIndex;

use super::parser::parse_variables;

/// Result of resolving one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    /// The input with every known reference substituted.
    pub resolved: String,

    /// Names that had no value, in order of appearance.
    pub unresolved: Vec<String>,
}

impl ResolutionResult {
    /// Whether every reference was substituted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Substitutes `{{name}}` references with constant values.
#[derive(Debug, Clone, Default)]
pub struct VariableResolver {
    values: IndexMap<String, String>,
}

impl VariableResolver {
    /// Creates a resolver over name → value pairs.
    #[must_use]
    pub const fn new(values: IndexMap<String, String>) -> Self {
        Self { values }
    }

    /// Creates a resolver from literal pairs.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )
    }

    /// Creates a resolver over the constants as seen from the API
    /// environment `env`.
    #[must_use]
    pub fn for_env(constants: &ConstantIndex, env: Option<&str>) -> Self {
        Self::new(constants.values_for_env(env))
    }

    /// Value of the constant `name`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Resolves every reference in `input`.
    #[must_use]
    pub fn resolve(&self, input: &str) -> ResolutionResult {
        let mut resolved = String::with_capacity(input.len());
        let mut unresolved = Vec::new();
        let mut last_end = 0;

        for reference in parse_variables(input) {
            resolved.push_str(&input[last_end..reference.span.start]);
            match self.value(&reference.name) {
                Some(value) => resolved.push_str(value),
                None => {
                    resolved.push_str(&input[reference.span.clone()]);
                    if !unresolved.contains(&reference.name) {
                        unresolved.push(reference.name);
                    }
                }
            }
            last_end = reference.span.end;
        }
        resolved.push_str(&input[last_end..]);

        ResolutionResult { resolved, unresolved }
    }
}
