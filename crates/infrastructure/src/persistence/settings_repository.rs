//! Settings persistence.
//!
//! Stores settings in the platform-specific config directory:
//! - Linux: ~/.config/apixt/settings.json
//! - macOS: ~/Library/Application Support/apixt/settings.json
//! - Windows: %APPDATA%/apixt/settings.json

use std::path::{Path, PathBuf};

use apixt_domain::Settings;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tokio::fs;
use tracing::{debug, info};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Error type for settings operations.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid settings JSON.
    #[error("Invalid settings at line {line}, column {column}: {message}")]
    Parse {
        /// 1-based line of the error.
        line: usize,
        /// 1-based column of the error.
        column: usize,
        /// What was wrong.
        message: String,
    },

    /// Settings could not be encoded.
    #[error("Cannot encode settings: {0}")]
    Encode(#[source] serde_json::Error),

    /// Could not determine config directory.
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Repository for settings persistence.
#[derive(Debug, Clone, Default)]
pub struct SettingsRepository {
    path: Option<PathBuf>,
}

impl SettingsRepository {
    /// Creates a repository over the platform settings file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: Self::default_path(),
        }
    }

    /// Creates a repository over an explicit file.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Path of the platform settings file, if a config directory exists.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("apixt").join("settings.json"))
    }

    /// Path this repository reads and writes.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads the settings.
    ///
    /// Returns default settings if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(&self) -> Result<Settings, SettingsError> {
        let Some(path) = &self.path else {
            return Ok(Settings::default());
        };

        if !fs::try_exists(path).await? {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Settings::default());
        }

        let content = fs::read(path).await?;
        let settings = Self::decode(&content)?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Saves the settings, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is available or the file cannot be
    /// written.
    pub async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Err(SettingsError::NoConfigDir);
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let content = Self::encode(settings)?;
        fs::write(path, content).await?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Encodes settings the way they are saved: 2-space indentation, model
    /// keys in insertion order, trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if a model value cannot be encoded.
    pub fn encode(settings: &Settings) -> Result<String, SettingsError> {
        let mut buffer = Vec::new();
        let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"  "));
        settings.serialize(&mut serializer).map_err(SettingsError::Encode)?;
        buffer.push(b'\n');
        // serde_json only emits UTF-8
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Decodes a settings file. A leading BOM is skipped and a blank file
    /// holds the default settings.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] with the position of the first
    /// invalid token.
    pub fn decode(content: &[u8]) -> Result<Settings, SettingsError> {
        let content = content.strip_prefix(BOM).unwrap_or(content);
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Settings::default());
        }
        serde_json::from_slice(content).map_err(|e| SettingsError::Parse {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        })
    }
}
