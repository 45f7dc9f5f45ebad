//! Integration tests for adding a rule: persist it on the feed, then triage
//! the feed's unread backlog.
//!
//! Each test runs against its own wiremock server standing in for Miniflux.

use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::sync::Mutex;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sift::i18n::Messages;
use sift::rules::{RuleError, RuleService, RuleType, TriageOutcome, TriageReport};
use sift::settings::{ConfigurationError, Settings, SettingsError, SettingsStore};

const TOKEN: &str = "test-token";

/// Settings held in memory, re-validated on every read.
struct MemorySettings {
    values: Mutex<(String, String)>,
}

impl MemorySettings {
    fn new(url: &str, key: &str) -> Self {
        Self {
            values: Mutex::new((url.to_string(), key.to_string())),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self) -> Result<Settings, ConfigurationError> {
        let values = self.values.lock().unwrap();
        Settings::new(&values.0, &values.1)
    }

    fn set(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.values.lock().unwrap() = (
            settings.api_base_url().to_string(),
            settings.api_key().expose_secret().to_string(),
        );
        Ok(())
    }
}

fn service_for(server: &MockServer) -> RuleService<MemorySettings> {
    RuleService::new(MemorySettings::new(&server.uri(), TOKEN), reqwest::Client::new())
}

fn entry(id: i64, title: Option<&str>, content: Option<&str>) -> Value {
    json!({
        "id": id,
        "feed_id": 42,
        "title": title,
        "content": content,
        "status": "unread"
    })
}

/// `count` unread entries starting at `first_id`, none matching "zzz".
fn filler_page(first_id: i64, count: usize) -> Value {
    let entries: Vec<Value> = (0..count as i64)
        .map(|i| entry(first_id + i, Some(format!("entry {}", first_id + i).as_str()), None))
        .collect();
    json!({ "total": entries.len(), "entries": entries })
}

async fn mount_feed(server: &MockServer, blocklist: Option<&str>, keeplist: Option<&str>) {
    Mock::given(method("GET"))
        .and(path("/v1/feeds/42"))
        .and(header("X-Auth-Token", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "title": "Example",
            "blocklist_rules": blocklist,
            "keeplist_rules": keeplist
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_feed_update(server: &MockServer, body: Value) {
    Mock::given(method("PUT"))
        .and(path("/v1/feeds/42"))
        .and(header("X-Auth-Token", TOKEN))
        .and(body_json(body))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 42 })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_entries_page(server: &MockServer, offset: usize, body: Value) {
    Mock::given(method("GET"))
        .and(path("/v1/feeds/42/entries"))
        .and(query_param("status", "unread"))
        .and(query_param("limit", "100"))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn expect_no_entry_update(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path("/v1/entries"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(server)
        .await;
}

fn completed(outcome: &TriageOutcome) -> &TriageReport {
    match outcome {
        TriageOutcome::Completed(report) => report,
        TriageOutcome::PatternRejected(e) => panic!("pattern unexpectedly rejected: {e}"),
    }
}

// ============================================================================
// Happy paths
// ============================================================================

#[tokio::test]
async fn test_block_rule_appended_and_backlog_marked() {
    let server = MockServer::start().await;
    mount_feed(&server, Some("spam|ads"), None).await;
    mount_feed_update(&server, json!({ "blocklist_rules": "spam|ads|crypto" })).await;
    mount_entries_page(
        &server,
        0,
        json!({
            "total": 3,
            "entries": [
                entry(1, Some("crypto news"), None),
                entry(2, Some("rust release"), Some("<p>nothing here</p>")),
                entry(3, Some("weekly"), Some("<p>crypto roundup</p>")),
            ]
        }),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/v1/entries"))
        .and(header("X-Auth-Token", TOKEN))
        .and(body_json(json!({ "entry_ids": [1, 3], "status": "read" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let applied = service_for(&server)
        .update_feed_rule(42, "crypto", RuleType::Block)
        .await
        .unwrap();

    assert_eq!(applied.rules, "spam|ads|crypto");
    let report = completed(&applied.triage);
    assert_eq!(report.pages, 1);
    assert_eq!(report.scanned, 3);
    assert_eq!(report.marked, vec![1, 3]);
    assert_eq!(
        applied.summary(&Messages::english()),
        "Rule saved. Marked 2 of 3 unread entries as read."
    );
}

#[tokio::test]
async fn test_keep_rule_marks_non_matching_entries() {
    let server = MockServer::start().await;
    mount_feed(&server, Some("spam"), None).await;
    mount_feed_update(&server, json!({ "keeplist_rules": "rust" })).await;
    mount_entries_page(
        &server,
        0,
        json!({
            "total": 3,
            "entries": [
                entry(1, Some("rust 1.80"), None),
                entry(2, Some("go 1.23"), None),
                entry(3, None, None),
            ]
        }),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/v1/entries"))
        .and(body_json(json!({ "entry_ids": [2, 3], "status": "read" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let applied = service_for(&server)
        .update_feed_rule(42, "rust", RuleType::Keep)
        .await
        .unwrap();

    assert_eq!(applied.rules, "rust");
    assert_eq!(completed(&applied.triage).marked, vec![2, 3]);
}

#[tokio::test]
async fn test_case_insensitive_prefix() {
    let server = MockServer::start().await;
    mount_feed(&server, None, None).await;
    mount_feed_update(&server, json!({ "blocklist_rules": "(?i)CRYPTO" })).await;
    mount_entries_page(
        &server,
        0,
        json!({
            "total": 2,
            "entries": [
                entry(1, Some("Crypto winter"), None),
                entry(2, Some("gardening"), None),
            ]
        }),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/v1/entries"))
        .and(body_json(json!({ "entry_ids": [1], "status": "read" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let applied = service_for(&server)
        .update_feed_rule(42, "(?i)CRYPTO", RuleType::Block)
        .await
        .unwrap();

    assert_eq!(applied.triage.marked_count(), 1);
}

#[tokio::test]
async fn test_existing_rule_is_not_duplicated() {
    let server = MockServer::start().await;
    mount_feed(&server, Some("spam|ads"), None).await;
    mount_feed_update(&server, json!({ "blocklist_rules": "spam|ads" })).await;
    mount_entries_page(&server, 0, filler_page(1, 0)).await;
    expect_no_entry_update(&server).await;

    let applied = service_for(&server)
        .update_feed_rule(42, "ads", RuleType::Block)
        .await
        .unwrap();

    assert_eq!(applied.rules, "spam|ads");
}

// ============================================================================
// Paging
// ============================================================================

#[tokio::test]
async fn test_page_requests_follow_backlog_size() {
    // (backlog size, expected page requests)
    for (backlog, expected_pages) in [(0usize, 1usize), (100, 2), (200, 3), (250, 3)] {
        let server = MockServer::start().await;
        mount_feed(&server, None, None).await;
        mount_feed_update(&server, json!({ "blocklist_rules": "zzz" })).await;

        for page in 0..expected_pages {
            let offset = page * 100;
            let count = backlog.saturating_sub(offset).min(100);
            mount_entries_page(&server, offset, filler_page(offset as i64 + 1, count)).await;
        }
        expect_no_entry_update(&server).await;

        let applied = service_for(&server)
            .update_feed_rule(42, "zzz", RuleType::Block)
            .await
            .unwrap();

        let report = completed(&applied.triage);
        assert_eq!(report.pages, expected_pages, "backlog of {backlog}");
        assert_eq!(report.scanned, backlog);
        assert!(report.marked.is_empty());
    }
}

/// Entries `first_id..first_id + count`, with "spam" in the titles of `spam_ids`.
fn page_with_matches(first_id: i64, count: usize, spam_ids: &[i64]) -> Value {
    let entries: Vec<Value> = (first_id..first_id + count as i64)
        .map(|id| {
            let title = if spam_ids.contains(&id) {
                format!("spam offer {id}")
            } else {
                format!("entry {id}")
            };
            entry(id, Some(title.as_str()), None)
        })
        .collect();
    json!({ "total": entries.len(), "entries": entries })
}

#[tokio::test]
async fn test_matches_across_pages_marked_in_one_batch() {
    let server = MockServer::start().await;
    mount_feed(&server, None, None).await;
    mount_feed_update(&server, json!({ "blocklist_rules": "spam" })).await;
    mount_entries_page(&server, 0, page_with_matches(1, 100, &[3, 100])).await;
    mount_entries_page(&server, 100, page_with_matches(101, 30, &[101, 120])).await;
    Mock::given(method("PUT"))
        .and(path("/v1/entries"))
        .and(body_json(
            json!({ "entry_ids": [3, 100, 101, 120], "status": "read" }),
        ))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let applied = service_for(&server)
        .update_feed_rule(42, "spam", RuleType::Block)
        .await
        .unwrap();

    let report = completed(&applied.triage);
    assert_eq!(report.pages, 2);
    assert_eq!(report.scanned, 130);
    assert_eq!(report.marked, vec![3, 100, 101, 120]);

    let entry_updates = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT" && r.url.path() == "/v1/entries")
        .count();
    assert_eq!(entry_updates, 1);
}

#[tokio::test]
async fn test_null_entries_treated_as_empty_page() {
    let server = MockServer::start().await;
    mount_feed(&server, None, None).await;
    mount_feed_update(&server, json!({ "blocklist_rules": "spam" })).await;
    mount_entries_page(&server, 0, json!({ "total": 0, "entries": null })).await;
    expect_no_entry_update(&server).await;

    let applied = service_for(&server)
        .update_feed_rule(42, "spam", RuleType::Block)
        .await
        .unwrap();

    assert_eq!(completed(&applied.triage).pages, 1);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_malformed_pattern_is_saved_but_backlog_untouched() {
    let server = MockServer::start().await;
    mount_feed(&server, None, None).await;
    mount_feed_update(&server, json!({ "blocklist_rules": "(unclosed" })).await;
    Mock::given(method("GET"))
        .and(path("/v1/feeds/42/entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(filler_page(1, 0)))
        .expect(0)
        .mount(&server)
        .await;
    expect_no_entry_update(&server).await;

    let applied = service_for(&server)
        .update_feed_rule(42, "(unclosed", RuleType::Block)
        .await
        .unwrap();

    assert_eq!(applied.rules, "(unclosed");
    assert!(matches!(applied.triage, TriageOutcome::PatternRejected(_)));
    assert!(applied
        .summary(&Messages::english())
        .starts_with("Rule saved. Unread entries were left untouched"));
}

#[tokio::test]
async fn test_feed_update_failure_stops_before_triage() {
    let server = MockServer::start().await;
    mount_feed(&server, None, None).await;
    Mock::given(method("PUT"))
        .and(path("/v1/feeds/42"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error_message": "invalid rule" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/feeds/42/entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(filler_page(1, 0)))
        .expect(0)
        .mount(&server)
        .await;

    let err = service_for(&server)
        .update_feed_rule(42, "spam", RuleType::Block)
        .await
        .unwrap_err();

    assert!(matches!(err, RuleError::FeedUpdate { feed_id: 42, .. }));
    assert!(!err.rule_persisted());
    assert_eq!(
        err.localized(&Messages::english()),
        "Failed to update feed: invalid rule"
    );
}

#[tokio::test]
async fn test_missing_feed_reports_status_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/feeds/42"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let err = service_for(&server)
        .update_feed_rule(42, "spam", RuleType::Block)
        .await
        .unwrap_err();

    assert!(matches!(err, RuleError::FeedFetch { .. }));
    assert_eq!(
        err.localized(&Messages::english()),
        "Failed to get feed: Not Found"
    );
}

#[tokio::test]
async fn test_entries_fetch_failure_keeps_persisted_rule() {
    let server = MockServer::start().await;
    mount_feed(&server, None, None).await;
    mount_feed_update(&server, json!({ "blocklist_rules": "spam" })).await;
    Mock::given(method("GET"))
        .and(path("/v1/feeds/42/entries"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({ "error_message": "database is locked" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    expect_no_entry_update(&server).await;

    let err = service_for(&server)
        .update_feed_rule(42, "spam", RuleType::Block)
        .await
        .unwrap_err();

    assert!(matches!(err, RuleError::EntriesFetch { offset: 0, .. }));
    assert!(err.rule_persisted());
    assert_eq!(
        err.localized(&Messages::english()),
        "Failed to get entries: database is locked"
    );
}

#[tokio::test]
async fn test_entry_update_failure_keeps_persisted_rule() {
    let server = MockServer::start().await;
    mount_feed(&server, None, None).await;
    mount_feed_update(&server, json!({ "blocklist_rules": "spam" })).await;
    mount_entries_page(
        &server,
        0,
        json!({ "total": 1, "entries": [entry(7, Some("spam offer"), None)] }),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/v1/entries"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = service_for(&server)
        .update_feed_rule(42, "spam", RuleType::Block)
        .await
        .unwrap_err();

    assert!(matches!(err, RuleError::EntryUpdate { count: 1, .. }));
    assert!(err.rule_persisted());
}

// ============================================================================
// Preconditions
// ============================================================================

#[tokio::test]
async fn test_unconfigured_settings_make_no_requests() {
    let server = MockServer::start().await;
    let service = RuleService::new(MemorySettings::new("", ""), reqwest::Client::new());

    let err = service
        .update_feed_rule(42, "spam", RuleType::Block)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RuleError::Configuration(ConfigurationError::NotConfigured)
    ));
    assert!(!err.rule_persisted());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_pattern_makes_no_requests() {
    let server = MockServer::start().await;

    let err = service_for(&server)
        .update_feed_rule(42, "   ", RuleType::Keep)
        .await
        .unwrap_err();

    assert!(matches!(err, RuleError::EmptyPattern));
    assert_eq!(
        err.localized(&Messages::english()),
        "Rule must not be empty"
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_settings_change_applies_without_restart() {
    let server = MockServer::start().await;
    let service = RuleService::new(MemorySettings::new("", ""), reqwest::Client::new());

    let err = service
        .update_feed_rule(42, "spam", RuleType::Block)
        .await
        .unwrap_err();
    assert!(matches!(err, RuleError::Configuration(_)));

    service
        .store()
        .set(&Settings::new(&server.uri(), TOKEN).unwrap())
        .unwrap();

    mount_feed(&server, None, None).await;
    mount_feed_update(&server, json!({ "blocklist_rules": "spam" })).await;
    mount_entries_page(&server, 0, filler_page(1, 0)).await;

    let applied = service
        .update_feed_rule(42, "spam", RuleType::Block)
        .await
        .unwrap();
    assert_eq!(applied.rules, "spam");
}
