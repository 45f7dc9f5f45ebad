//! Configuration file parser for ~/.config/sift/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning for each one
//! since they are usually typos.
//!
//! Credentials do not live here; see [`crate::settings`].
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Failure loading `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config.toml is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

/// Settings that shape the CLI and browser. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Message catalog language (e.g. "en", "zh_CN"). `None` falls back to `LANG`.
    pub language: Option<String>,

    /// Resolve thumbnail previews for entries shown in the browser.
    pub thumbnails: bool,

    /// Timeout applied to every API request, in seconds.
    pub request_timeout_secs: u64,

    /// Number of unread entries loaded into the browser per reload.
    pub browse_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: None,
            thumbnails: false,
            request_timeout_secs: 30,
            browse_limit: 200,
        }
    }
}

/// Upper bound on the config file size.
const MAX_CONFIG_BYTES: u64 = 1 << 20;

const KNOWN_KEYS: &[&str] = &["language", "thumbnails", "request_timeout_secs", "browse_limit"];

/// File contents, or `None` when there is no file.
fn read_bounded(path: &Path) -> Result<Option<String>, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    };

    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(e)),
    };
    if size > MAX_CONFIG_BYTES {
        return Err(ConfigError::TooLarge {
            size,
            limit: MAX_CONFIG_BYTES,
        });
    }

    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(e)),
    }
}

impl Config {
    /// Read `path`. A missing or blank file gives the defaults; keys sift does
    /// not know are logged and otherwise ignored.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = read_bounded(path)?.filter(|c| !c.trim().is_empty()) else {
            tracing::debug!(path = %path.display(), "No config, using defaults");
            return Ok(Self::default());
        };

        let table: toml::Table = content.parse()?;
        table
            .keys()
            .filter(|key| !KNOWN_KEYS.contains(&key.as_str()))
            .for_each(|key| tracing::warn!(key = %key, path = %path.display(), "Ignoring unknown config key"));

        let config: Config = toml::Value::Table(table).try_into()?;
        tracing::info!(
            path = %path.display(),
            language = config.language.as_deref().unwrap_or("-"),
            thumbnails = config.thumbnails,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Request timeout as a [`Duration`]. A zero value is bumped to one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
