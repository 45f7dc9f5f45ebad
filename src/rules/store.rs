use crate::api::{Feed, FeedRulesUpdate, MinifluxClient};

use super::{RuleError, RuleType};

/// Separator between patterns in a serialized rule list.
pub const RULE_SEPARATOR: &str = "|";

/// Append `pattern` to a serialized rule list.
///
/// Existing order is kept and the first occurrence of each literal pattern
/// wins, so appending a pattern that is already present returns the list
/// unchanged. A pattern containing `|` is stored as separate segments on the
/// server, so it is split the same way before deduplicating. Comparison is on
/// the string form only: `(?i)ads` and `(?i)ADS` are different rules.
pub fn merge_rules(existing: Option<&str>, pattern: &str) -> String {
    let mut rules: Vec<&str> = match existing {
        Some(s) if !s.is_empty() => s.split(RULE_SEPARATOR).collect(),
        _ => Vec::new(),
    };
    rules.extend(pattern.split(RULE_SEPARATOR));

    let mut merged: Vec<&str> = Vec::with_capacity(rules.len());
    for rule in rules {
        if !merged.contains(&rule) {
            merged.push(rule);
        }
    }
    merged.join(RULE_SEPARATOR)
}

/// The feed's current serialized list for `rule_type`.
pub fn current_rules(feed: &Feed, rule_type: RuleType) -> Option<&str> {
    match rule_type {
        RuleType::Block => feed.blocklist_rules.as_deref(),
        RuleType::Keep => feed.keeplist_rules.as_deref(),
    }
}

/// Update body touching only the list for `rule_type`.
pub fn rules_update(rule_type: RuleType, serialized: String) -> FeedRulesUpdate {
    match rule_type {
        RuleType::Block => FeedRulesUpdate {
            blocklist_rules: Some(serialized),
            keeplist_rules: None,
        },
        RuleType::Keep => FeedRulesUpdate {
            blocklist_rules: None,
            keeplist_rules: Some(serialized),
        },
    }
}

/// Read the feed, append `pattern` to the list for `rule_type`, write it back.
///
/// Returns the serialized list that was written. Nothing is rolled back: a
/// rejected write leaves the server as it was.
pub async fn append_rule(
    client: &MinifluxClient,
    feed_id: i64,
    pattern: &str,
    rule_type: RuleType,
) -> Result<String, RuleError> {
    if pattern.trim().is_empty() {
        return Err(RuleError::EmptyPattern);
    }

    let feed = client
        .get_feed(feed_id)
        .await
        .map_err(|source| RuleError::FeedFetch { feed_id, source })?;

    let existing = current_rules(&feed, rule_type);
    let merged = merge_rules(existing, pattern);
    if existing == Some(merged.as_str()) {
        tracing::debug!(feed_id, rule_type = %rule_type, "Rule already present");
    }

    client
        .update_feed_rules(feed_id, &rules_update(rule_type, merged.clone()))
        .await
        .map_err(|source| RuleError::FeedUpdate { feed_id, source })?;

    tracing::info!(
        feed_id,
        rule_type = %rule_type,
        rules = merged.split(RULE_SEPARATOR).count(),
        "Saved feed rule"
    );
    Ok(merged)
}
