//! Settings entities.
//!
//! Each kind is a thin declaration over one of the generic indices in
//! [`crate::entity`]: which properties it exposes, which of them a text
//! filter searches, and a few typed lookups.

mod api_env;
mod assignment;
mod constant;
mod env_override;
mod key_binding;
mod plugin;
mod request;
mod route;

pub use api_env::ApiEnvIndex;
pub use assignment::{
    AssignmentAction, AssignmentIndex, AssignmentListing, AssignmentTarget, AssignmentType,
    ContentTypeChoice, ExtractSource, ListedAssignment, RequestAssignments, content_type_choice,
    listed_assignments, normalize_query,
};
pub use constant::ConstantIndex;
pub use env_override::EnvOverrideIndex;
pub use key_binding::KeyBindingIndex;
pub use plugin::{PluginIndex, PluginInfo, PluginRegistry};
pub use request::{RequestIndex, SavedRequest};
pub use route::{Route, RouteIndex};
