//! Settings Domain Model
//!
//! Everything the client persists locally: API environments, constants,
//! saved requests, key bindings, plugin flags, theme and stream options.
//! Entity collections are stored in their mapping-index form so they can be
//! edited through the matching index and written back unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entities::{
    ApiEnvIndex, ConstantIndex, KeyBindingIndex, PluginIndex, PluginRegistry, RequestIndex,
};
use crate::entity::Model;

/// Theme mode preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light mode theme.
    Light,
    /// Dark mode theme (default).
    #[default]
    Dark,
    /// Follow system theme preference.
    System,
}

impl ThemeMode {
    /// Returns true if dark mode should be used based on the preference.
    /// For System mode, this should be determined by the OS preference.
    #[must_use]
    pub const fn is_dark(self) -> bool {
        match self {
            Self::Light => false,
            Self::Dark | Self::System => true,
        }
    }
}

/// Options of response streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Status codes accepted from the backend.
    #[serde(default = "default_expected_status")]
    pub expected_status: Vec<u16>,

    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay between lines when replaying a recorded stream.
    #[serde(default = "default_replay_interval_ms")]
    pub replay_interval_ms: u64,
}

fn default_expected_status() -> Vec<u16> {
    vec![200]
}

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_replay_interval_ms() -> u64 {
    100
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            expected_status: default_expected_status(),
            timeout_ms: default_timeout_ms(),
            replay_interval_ms: default_replay_interval_ms(),
        }
    }
}

impl StreamSettings {
    /// Whether `status` is an accepted response code.
    #[must_use]
    pub fn accepts(&self, status: u16) -> bool {
        self.expected_status.contains(&status)
    }
}

/// Persisted client settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// API environments, see [`ApiEnvIndex`].
    #[serde(default)]
    pub api_envs: Model,

    /// Key of the API environment requests are sent to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_api_env: Option<String>,

    /// Constants, see [`ConstantIndex`].
    #[serde(default)]
    pub constants: Model,

    /// Saved requests, see [`RequestIndex`].
    #[serde(default)]
    pub requests: Model,

    /// Key bindings, see [`KeyBindingIndex`].
    #[serde(default)]
    pub key_bindings: Model,

    /// Plugin activation flags, see [`PluginIndex`].
    #[serde(default)]
    pub plugins: Model,

    /// Theme mode preference.
    #[serde(default)]
    pub theme: ThemeMode,

    /// Stream options.
    #[serde(default)]
    pub stream: StreamSettings,
}

impl Settings {
    /// Index over the API environments.
    #[must_use]
    pub fn api_env_index(&self) -> ApiEnvIndex {
        ApiEnvIndex::new(self.api_envs.clone())
    }

    /// Index over the constants.
    #[must_use]
    pub fn constant_index(&self) -> ConstantIndex {
        ConstantIndex::new(self.constants.clone())
    }

    /// Index over the saved requests.
    #[must_use]
    pub fn request_index(&self) -> RequestIndex {
        RequestIndex::new(self.requests.clone())
    }

    /// Index over the key bindings.
    #[must_use]
    pub fn key_binding_index(&self) -> KeyBindingIndex {
        KeyBindingIndex::new(self.key_bindings.clone())
    }

    /// Index over the plugin flags, described by `registry`.
    #[must_use]
    pub fn plugin_index(&self, registry: Arc<PluginRegistry>) -> PluginIndex {
        PluginIndex::new(self.plugins.clone(), registry)
    }

    /// Base URL of the active API environment.
    #[must_use]
    pub fn active_base_url(&self) -> Option<String> {
        let key = self.active_api_env.as_deref()?;
        self.api_env_index().url(key)
    }
}
