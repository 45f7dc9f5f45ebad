//! Message catalogs for user-facing text.
//!
//! A [`Messages`] value is loaded once per session and handed to everything
//! that renders text for the user. Catalogs use the
//! `{"key": {"message": "..."}}` layout with positional `%s` placeholders.
//!
//! Lookup order for a key: the resolved catalog, then the built-in English
//! catalog, then the key itself.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

const BUILTIN_EN: &str = include_str!("../locales/en/messages.json");
const BUILTIN_ZH_CN: &str = include_str!("../locales/zh_CN/messages.json");

/// Language used when nothing else resolves.
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Error)]
pub enum I18nError {
    #[error("Failed to read message catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid message catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct CatalogEntry {
    message: String,
}

fn parse_catalog(json: &str) -> Result<HashMap<String, String>, I18nError> {
    let raw: HashMap<String, CatalogEntry> = serde_json::from_str(json)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.message)).collect())
}

fn builtin_catalog(language: &str) -> Option<&'static str> {
    match language {
        "en" => Some(BUILTIN_EN),
        "zh_CN" | "zh" => Some(BUILTIN_ZH_CN),
        _ => None,
    }
}

/// Normalize a language tag: `zh-CN` and `zh_CN.UTF-8` both become `zh_CN`.
/// `C`, `POSIX` and empty tags map to the default language.
pub fn normalize_language(tag: &str) -> String {
    let base = tag.split(['.', '@']).next().unwrap_or("").trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return DEFAULT_LANGUAGE.to_string();
    }
    base.replace('-', "_")
}

/// Localized message catalog for one session.
#[derive(Debug, Clone)]
pub struct Messages {
    language: String,
    catalog: HashMap<String, String>,
    fallback: HashMap<String, String>,
}

impl Messages {
    /// Load the catalog for `language`.
    ///
    /// Tries `lang`, then its primary subtag (`zh_TW` → `zh`), then English.
    /// For each candidate a file under `override_dir/<lang>/messages.json`
    /// takes precedence over the built-in catalog. Broken files are logged and
    /// skipped, so this never fails.
    pub fn load(language: &str, override_dir: Option<&Path>) -> Self {
        let fallback = parse_catalog(BUILTIN_EN).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Built-in English catalog is invalid");
            HashMap::new()
        });

        let normalized = normalize_language(language);
        let mut candidates = vec![normalized.clone()];
        if let Some((primary, _)) = normalized.split_once('_') {
            candidates.push(primary.to_string());
        }
        candidates.push(DEFAULT_LANGUAGE.to_string());

        for candidate in &candidates {
            if let Some(dir) = override_dir {
                let path = dir.join(candidate).join("messages.json");
                if path.is_file() {
                    match std::fs::read_to_string(&path)
                        .map_err(I18nError::from)
                        .and_then(|json| parse_catalog(&json))
                    {
                        Ok(catalog) => {
                            tracing::debug!(path = %path.display(), "Loaded message catalog override");
                            return Self {
                                language: candidate.clone(),
                                catalog,
                                fallback,
                            };
                        }
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "Skipping message catalog");
                        }
                    }
                }
            }

            if let Some(json) = builtin_catalog(candidate) {
                match parse_catalog(json) {
                    Ok(catalog) => {
                        tracing::debug!(language = %candidate, "Loaded built-in message catalog");
                        return Self {
                            language: candidate.clone(),
                            catalog,
                            fallback,
                        };
                    }
                    Err(e) => {
                        tracing::error!(language = %candidate, error = %e, "Built-in catalog is invalid");
                    }
                }
            }
        }

        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            catalog: fallback.clone(),
            fallback,
        }
    }

    /// Built-in English catalog without any override lookup.
    pub fn english() -> Self {
        Self::load(DEFAULT_LANGUAGE, None)
    }

    /// Language actually in use after fallback.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Look up `key`. Unknown keys come back verbatim.
    pub fn get(&self, key: &str) -> String {
        self.catalog
            .get(key)
            .or_else(|| self.fallback.get(key))
            .cloned()
            .unwrap_or_else(|| {
                tracing::debug!(key, "Missing message key");
                key.to_string()
            })
    }

    /// Look up `key` and substitute each `%s` with the next argument.
    /// Placeholders without a matching argument become empty.
    pub fn format(&self, key: &str, args: &[&str]) -> String {
        let template = self.get(key);
        let mut out = String::with_capacity(template.len());
        let mut args = args.iter();
        let mut parts = template.split("%s");
        if let Some(first) = parts.next() {
            out.push_str(first);
        }
        for part in parts {
            if let Some(arg) = args.next() {
                out.push_str(arg);
            }
            out.push_str(part);
        }
        out
    }
}
