//! Per-feed block/keep rules and backlog triage.
//!
//! Adding a rule is two independent steps:
//!
//! - [`store`] - append the pattern to the feed's rule list on the server
//! - [`triage`] - apply the same pattern to the feed's unread backlog
//!
//! [`service`] runs both for one user action. A persisted rule is never
//! undone by a later triage failure.

mod service;
mod store;
mod triage;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::api::ApiError;
use crate::i18n::Messages;
use crate::settings::ConfigurationError;

pub use service::{RuleApplied, RuleService};
pub use store::{append_rule, current_rules, merge_rules, rules_update, RULE_SEPARATOR};
pub use triage::{
    select_entries, triage_backlog, PatternError, RulePattern, TriageOutcome, TriageReport,
    CASE_INSENSITIVE_PREFIX, PAGE_SIZE,
};

/// Which rule list a pattern goes into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// Matching entries are marked read.
    #[default]
    Block,
    /// Non-matching entries are marked read.
    Keep,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::Block => "block",
            RuleType::Keep => "keep",
        }
    }

    /// Whether an entry with the given match result gets marked read.
    pub fn selects(self, matched: bool) -> bool {
        match self {
            RuleType::Block => matched,
            RuleType::Keep => !matched,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            RuleType::Block => RuleType::Keep,
            RuleType::Keep => RuleType::Block,
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(RuleType::Block),
            "keep" => Ok(RuleType::Keep),
            other => Err(format!("unknown rule type: {other}")),
        }
    }
}

/// Failure while adding a rule or applying it to the backlog.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Rule must not be empty")]
    EmptyPattern,

    #[error("Failed to get feed {feed_id}: {source}")]
    FeedFetch {
        feed_id: i64,
        #[source]
        source: ApiError,
    },

    #[error("Failed to update feed {feed_id}: {source}")]
    FeedUpdate {
        feed_id: i64,
        #[source]
        source: ApiError,
    },

    #[error("Failed to get unread entries of feed {feed_id} at offset {offset}: {source}")]
    EntriesFetch {
        feed_id: i64,
        offset: usize,
        #[source]
        source: ApiError,
    },

    #[error("Failed to mark {count} entries as read: {source}")]
    EntryUpdate {
        count: usize,
        #[source]
        source: ApiError,
    },
}

impl RuleError {
    /// True when the rule was already saved on the server before this error.
    pub fn rule_persisted(&self) -> bool {
        matches!(
            self,
            RuleError::EntriesFetch { .. } | RuleError::EntryUpdate { .. }
        )
    }

    /// User-facing text, with the server's detail when it sent one.
    pub fn localized(&self, messages: &Messages) -> String {
        match self {
            RuleError::Configuration(e) => e.localized(messages),
            RuleError::EmptyPattern => messages.get("emptyRule"),
            RuleError::FeedFetch { source, .. } => {
                messages.format("getFeedError", &[&source.detail()])
            }
            RuleError::FeedUpdate { source, .. } => {
                messages.format("updateFeedError", &[&source.detail()])
            }
            RuleError::EntriesFetch { source, .. } => {
                messages.format("getEntriesError", &[&source.detail()])
            }
            RuleError::EntryUpdate { source, .. } => {
                messages.format("updateEntriesError", &[&source.detail()])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error() -> ApiError {
        ApiError::Status {
            status: 500,
            status_text: "Internal Server Error".into(),
            message: Some("database is locked".into()),
        }
    }

    #[test]
    fn test_selects() {
        assert!(RuleType::Block.selects(true));
        assert!(!RuleType::Block.selects(false));
        assert!(!RuleType::Keep.selects(true));
        assert!(RuleType::Keep.selects(false));
    }

    #[test]
    fn test_rule_type_parse() {
        assert_eq!("block".parse::<RuleType>().unwrap(), RuleType::Block);
        assert_eq!(" KEEP ".parse::<RuleType>().unwrap(), RuleType::Keep);
        assert!("allow".parse::<RuleType>().is_err());
        assert_eq!(RuleType::Keep.to_string(), "keep");
        assert_eq!(RuleType::Block.toggled(), RuleType::Keep);
    }

    #[test]
    fn test_rule_persisted() {
        assert!(!RuleError::EmptyPattern.rule_persisted());
        assert!(!RuleError::Configuration(ConfigurationError::NotConfigured).rule_persisted());
        assert!(!RuleError::FeedFetch {
            feed_id: 1,
            source: status_error()
        }
        .rule_persisted());
        assert!(!RuleError::FeedUpdate {
            feed_id: 1,
            source: status_error()
        }
        .rule_persisted());
        assert!(RuleError::EntriesFetch {
            feed_id: 1,
            offset: 0,
            source: status_error()
        }
        .rule_persisted());
        assert!(RuleError::EntryUpdate {
            count: 3,
            source: status_error()
        }
        .rule_persisted());
    }

    #[test]
    fn test_localized_uses_server_detail() {
        let messages = Messages::english();
        let err = RuleError::FeedUpdate {
            feed_id: 42,
            source: status_error(),
        };
        assert_eq!(
            err.localized(&messages),
            "Failed to update feed: database is locked"
        );
    }

    #[test]
    fn test_localized_configuration() {
        let messages = Messages::english();
        let err = RuleError::from(ConfigurationError::NotConfigured);
        assert!(err.localized(&messages).contains("configure"));
    }
}
