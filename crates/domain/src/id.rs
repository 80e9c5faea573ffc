//! ID generation utilities.

use uuid::Uuid;

/// Generates a new time-ordered UUID (v7) as a string.
///
/// Used as the model key of entities created locally (constants, saved
/// requests), so keys stay unique across renames of the display name.
#[must_use]
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}
