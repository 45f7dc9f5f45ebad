use std::time::Duration;

use crate::api::{MinifluxClient, DEFAULT_TIMEOUT};
use crate::i18n::Messages;
use crate::settings::{ConfigurationError, SettingsStore};

use super::store::append_rule;
use super::triage::{triage_backlog, TriageOutcome};
use super::{RuleError, RuleType};

/// Result of a successful [`RuleService::update_feed_rule`].
#[derive(Debug)]
pub struct RuleApplied {
    /// Serialized rule list written to the feed.
    pub rules: String,
    pub triage: TriageOutcome,
}

impl RuleApplied {
    /// One-line summary for the user.
    pub fn summary(&self, messages: &Messages) -> String {
        match &self.triage {
            TriageOutcome::Completed(report) => messages.format(
                "ruleSaved",
                &[&report.marked.len().to_string(), &report.scanned.to_string()],
            ),
            TriageOutcome::PatternRejected(e) => messages.format(
                "ruleSavedBacklogSkipped",
                &[&messages.format("invalidRegex", &[&e.source.to_string()])],
            ),
        }
    }
}

/// Entry point for rule operations.
///
/// Holds the settings source and HTTP connection pool, but never the settings
/// themselves: each call reads them again.
pub struct RuleService<S> {
    store: S,
    http: reqwest::Client,
    timeout: Duration,
}

impl<S: SettingsStore> RuleService<S> {
    pub fn new(store: S, http: reqwest::Client) -> Self {
        Self {
            store,
            http,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Client built from freshly loaded settings.
    pub fn client(&self) -> Result<MinifluxClient, ConfigurationError> {
        let settings = self.store.get().inspect_err(|e| {
            tracing::error!(error = %e, "Failed to get settings");
        })?;
        Ok(MinifluxClient::new(self.http.clone(), settings).with_timeout(self.timeout))
    }

    /// Save `pattern` as a `rule_type` rule on the feed, then apply it to the
    /// feed's unread backlog.
    ///
    /// Settings are validated before any request. When this returns an error,
    /// [`RuleError::rule_persisted`] tells whether the rule was saved anyway.
    pub async fn update_feed_rule(
        &self,
        feed_id: i64,
        pattern: &str,
        rule_type: RuleType,
    ) -> Result<RuleApplied, RuleError> {
        let result = self.run(feed_id, pattern, rule_type).await;
        if let Err(e) = &result {
            tracing::error!(
                feed_id,
                rule_type = %rule_type,
                persisted = e.rule_persisted(),
                error = %e,
                "Failed to update rule"
            );
        }
        result
    }

    async fn run(
        &self,
        feed_id: i64,
        pattern: &str,
        rule_type: RuleType,
    ) -> Result<RuleApplied, RuleError> {
        if pattern.trim().is_empty() {
            return Err(RuleError::EmptyPattern);
        }
        let client = self.client()?;
        let rules = append_rule(&client, feed_id, pattern, rule_type).await?;
        let triage = triage_backlog(&client, feed_id, pattern, rule_type).await?;
        Ok(RuleApplied { rules, triage })
    }
}
