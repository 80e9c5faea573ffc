//! Clock port

use chrono::{DateTime, Utc};

/// Source of the timestamps carried by stage events.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}
