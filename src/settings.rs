//! Connection settings for the Miniflux API: base URL and API token.
//!
//! Settings are kept apart from `config.toml` in `settings.toml`, readable by
//! the owner only. They are re-read on every rule operation so a token change
//! takes effect on the next action without a restart.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::i18n::Messages;

/// Missing or invalid connection settings. Raised before any network call.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("API base URL and API key are not configured")]
    NotConfigured,

    #[error("Invalid API base URL: {0}")]
    InvalidApiUrl(String),

    #[error("API key must not be empty")]
    InvalidApiKey,

    #[error("Failed to read settings file: {0}")]
    Unreadable(String),
}

impl ConfigurationError {
    /// User-facing text for this error.
    pub fn localized(&self, messages: &Messages) -> String {
        match self {
            Self::NotConfigured => messages.get("configureFirst"),
            Self::InvalidApiUrl(_) => messages.get("invalidApiUrl"),
            Self::InvalidApiKey => messages.get("invalidApiKey"),
            Self::Unreadable(detail) => messages.format("settingsLoadError", &[detail]),
        }
    }
}

/// Failure while persisting settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to write settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Validated connection settings.
///
/// Can only be built through [`Settings::new`], so every value in circulation
/// has a parseable absolute base URL and a non-empty key.
pub struct Settings {
    api_base_url: Url,
    api_key: SecretString,
}

impl Settings {
    /// Validate and build settings. Surrounding whitespace is trimmed from both values.
    pub fn new(api_base_url: &str, api_key: &str) -> Result<Self, ConfigurationError> {
        let api_base_url = api_base_url.trim();
        let api_key = api_key.trim();

        if api_base_url.is_empty() {
            return Err(ConfigurationError::NotConfigured);
        }
        let url = Url::parse(api_base_url)
            .map_err(|e| ConfigurationError::InvalidApiUrl(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ConfigurationError::InvalidApiUrl(format!(
                    "unsupported scheme: {scheme}"
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(ConfigurationError::InvalidApiUrl("missing host".into()));
        }
        if api_key.is_empty() {
            return Err(ConfigurationError::InvalidApiKey);
        }

        Ok(Self {
            api_base_url: url,
            api_key: SecretString::from(api_key.to_string()),
        })
    }

    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Source of connection settings.
pub trait SettingsStore {
    /// Load and validate the current settings. Never cached.
    fn get(&self) -> Result<Settings, ConfigurationError>;

    /// Persist settings, replacing whatever was stored.
    fn set(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// On-disk shape. Both fields optional so a half-written file reads as "not configured".
#[derive(Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

/// [`SettingsStore`] backed by a TOML file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_stored(&self) -> Result<StoredSettings, ConfigurationError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No settings file found");
                return Ok(StoredSettings::default());
            }
            Err(e) => return Err(ConfigurationError::Unreadable(e.to_string())),
        };
        toml::from_str(&content).map_err(|e| ConfigurationError::Unreadable(e.to_string()))
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self) -> Result<Settings, ConfigurationError> {
        let stored = self.read_stored()?;
        let (Some(url), Some(key)) = (stored.api_base_url, stored.api_key) else {
            return Err(ConfigurationError::NotConfigured);
        };
        if url.trim().is_empty() || key.trim().is_empty() {
            return Err(ConfigurationError::NotConfigured);
        }
        Settings::new(&url, &key)
    }

    fn set(&self, settings: &Settings) -> Result<(), SettingsError> {
        let stored = StoredSettings {
            api_base_url: Some(settings.api_base_url.to_string()),
            api_key: Some(settings.api_key.expose_secret().to_string()),
        };
        let content = toml::to_string(&stored)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        atomic_write(&self.path, content.as_bytes())?;
        tracing::info!(path = %self.path.display(), "Saved API settings");
        Ok(())
    }
}

/// Write via a fresh temp file and rename so the destination is never partial.
fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut temp_file = options.open(&temp_path)?;

    let written = temp_file
        .write_all(content)
        .and_then(|_| temp_file.sync_all());
    drop(temp_file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    #[cfg(windows)]
    if dst.exists() {
        std::fs::remove_file(dst)?;
    }

    std::fs::rename(&temp_path, dst).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })
}
