//! User settings: API credential, default title, custom prompt, auto-clear.
//!
//! Persisted in `settings.json`, a separate file from the image collection.
//! The credential never travels with the images.

use crate::error::TabscribeError;
use crate::export::write_file_atomic;
use crate::transcribe::DEFAULT_PROMPT;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// File name of the settings bag inside the data directory.
pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: Option<String>,
    pub default_title: Option<String>,
    custom_prompt: Option<String>,
    /// Clear the image collection after a successful transcription.
    pub auto_clear: bool,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("default_title", &self.default_title)
            .field("custom_prompt", &self.custom_prompt.as_ref().map(|p| p.len()))
            .field("auto_clear", &self.auto_clear)
            .finish()
    }
}

impl Settings {
    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, TabscribeError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(TabscribeError::SettingsUnreadable {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            TabscribeError::InvalidConfig(format!("settings file '{}' is corrupt: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), TabscribeError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| TabscribeError::Internal(format!("serialising settings: {e}")))?;
        write_file_atomic(path, &json)?;
        info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Delete the settings file. Missing is fine.
    pub fn reset(path: &Path) -> Result<(), TabscribeError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TabscribeError::OutputWriteFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// The saved custom prompt, else [`DEFAULT_PROMPT`].
    pub fn prompt(&self) -> &str {
        self.custom_prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }

    pub fn custom_prompt(&self) -> Option<&str> {
        self.custom_prompt.as_deref()
    }

    /// Save a custom prompt, or `None` to go back to the default.
    ///
    /// A blank prompt is refused.
    pub fn set_custom_prompt(&mut self, prompt: Option<&str>) -> Result<(), TabscribeError> {
        match prompt.map(str::trim) {
            Some("") => Err(TabscribeError::InvalidConfig("Prompt cannot be empty".into())),
            Some(p) => {
                self.custom_prompt = Some(p.to_string());
                Ok(())
            }
            None => {
                self.custom_prompt = None;
                Ok(())
            }
        }
    }

    /// Output title: the default title, else `Transcription-YYYY-MM-DD-HHMMSS`.
    pub fn title(&self, now: DateTime<Utc>) -> String {
        match self.default_title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => format!("Transcription-{}", now.format("%Y-%m-%d-%H%M%S")),
        }
    }
}
