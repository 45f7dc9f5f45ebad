use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::api::{Entry, MinifluxClient};

use super::{RuleError, RuleType};

/// Unread entries requested per page.
pub const PAGE_SIZE: usize = 100;

/// Inline flag the server's regex dialect uses for case-insensitive rules.
pub const CASE_INSENSITIVE_PREFIX: &str = "(?i)";

/// A rule pattern the local regex engine could not compile.
#[derive(Debug, Error)]
#[error("Invalid rule pattern {pattern:?}: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// A compiled rule pattern.
#[derive(Debug, Clone)]
pub struct RulePattern {
    regex: Regex,
    case_insensitive: bool,
}

impl RulePattern {
    /// Compile `pattern`. A leading `(?i)` is stripped and turns on
    /// case-insensitive matching; anything else matches case-sensitively.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let (source, case_insensitive) = match pattern.strip_prefix(CASE_INSENSITIVE_PREFIX) {
            Some(rest) => (rest, true),
            None => (pattern, false),
        };

        let regex = RegexBuilder::new(source)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|source| PatternError {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            regex,
            case_insensitive,
        })
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Title or content matches. Missing or empty fields never match.
    pub fn matches_entry(&self, entry: &Entry) -> bool {
        let field_matches = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|text| !text.is_empty() && self.is_match(text))
        };
        field_matches(&entry.title) || field_matches(&entry.content)
    }
}

/// Ids of the entries a rule marks read, in input order.
pub fn select_entries(pattern: &RulePattern, rule_type: RuleType, entries: &[Entry]) -> Vec<i64> {
    entries
        .iter()
        .filter(|entry| rule_type.selects(pattern.matches_entry(entry)))
        .map(|entry| entry.id)
        .collect()
}

/// Counters from a finished triage run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriageReport {
    /// Page requests issued, including the final short or empty page.
    pub pages: usize,
    /// Unread entries examined.
    pub scanned: usize,
    /// Entries marked read, in enumeration order.
    pub marked: Vec<i64>,
}

/// Result of a triage run that did not hit an API error.
#[derive(Debug)]
pub enum TriageOutcome {
    Completed(TriageReport),
    /// The pattern does not compile locally. Nothing was fetched or marked;
    /// the persisted rule still applies to future entries on the server.
    PatternRejected(PatternError),
}

impl TriageOutcome {
    pub fn marked_count(&self) -> usize {
        match self {
            TriageOutcome::Completed(report) => report.marked.len(),
            TriageOutcome::PatternRejected(_) => 0,
        }
    }
}

/// Apply a just-saved rule to the feed's unread backlog.
///
/// Pages through unread entries sequentially from offset 0 until a page comes
/// back with fewer than [`PAGE_SIZE`] entries, so a backlog that is an exact
/// multiple of the page size costs one extra, empty, request. Selected ids are
/// marked read in a single batch; no request is made when nothing is selected.
///
/// A pattern that fails to compile is logged and reported through
/// [`TriageOutcome::PatternRejected`], never as an error.
pub async fn triage_backlog(
    client: &MinifluxClient,
    feed_id: i64,
    pattern: &str,
    rule_type: RuleType,
) -> Result<TriageOutcome, RuleError> {
    let compiled = match RulePattern::compile(pattern) {
        Ok(compiled) => compiled,
        Err(e) => {
            tracing::warn!(feed_id, error = %e, "Rule pattern rejected locally, leaving backlog untouched");
            return Ok(TriageOutcome::PatternRejected(e));
        }
    };

    let mut report = TriageReport::default();
    let mut offset = 0;
    loop {
        let entries = client
            .unread_feed_entries(feed_id, PAGE_SIZE, offset)
            .await
            .map_err(|source| RuleError::EntriesFetch {
                feed_id,
                offset,
                source,
            })?
            .into_entries();
        report.pages += 1;
        report.scanned += entries.len();
        report
            .marked
            .extend(select_entries(&compiled, rule_type, &entries));

        tracing::debug!(feed_id, offset, fetched = entries.len(), "Fetched unread page");

        if entries.len() != PAGE_SIZE {
            break;
        }
        offset += PAGE_SIZE;
    }

    if !report.marked.is_empty() {
        client
            .mark_entries_read(&report.marked)
            .await
            .map_err(|source| RuleError::EntryUpdate {
                count: report.marked.len(),
                source,
            })?;
    }

    tracing::info!(
        feed_id,
        rule_type = %rule_type,
        pages = report.pages,
        scanned = report.scanned,
        marked = report.marked.len(),
        "Applied rule to unread backlog"
    );
    Ok(TriageOutcome::Completed(report))
}
