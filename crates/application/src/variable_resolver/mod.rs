//! Constant substitution
//!
//! Requests reference constants as `{{name}}`. The values come from the
//! [`ConstantIndex`](apixt_domain::ConstantIndex) of the active API
//! environment; references without a value are left verbatim and reported.
//!
//! # Usage
//!
//! ```
//! use apixt_application::variable_resolver::VariableResolver;
//!
//! let resolver = VariableResolver::from_pairs([("host", "localhost")]);
//! let result = resolver.resolve("http://{{host}}/{{missing}}");
//! assert_eq!(result.resolved, "http://localhost/{{missing}}");
//! assert_eq!(result.unresolved, vec!["missing"]);
//! ```

pub mod engine;
pub mod parser;

pub use engine::{ResolutionResult, VariableResolver};
pub use parser::{VariableReference, has_variables, parse_variables};
