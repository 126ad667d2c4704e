use chrono::{TimeZone, Utc};
use republish_core::{ArticleRecord, ArticleStatus, Decision, Ledger, Transition};

const URL: &str = "https://mp.weixin.qq.com/s/u1";

fn record(status: ArticleStatus, fingerprint: Option<&str>) -> ArticleRecord {
    ArticleRecord {
        source_url: URL.to_string(),
        content_fingerprint: fingerprint.map(str::to_string),
        status,
        last_processed_at: Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap(),
        artifact_path: None,
        failure_reason: None,
        failed_stage: None,
        staged_artifact: None,
    }
}

#[test]
fn unknown_url_is_new() {
    let ledger = Ledger::new();
    assert_eq!(ledger.decide(URL, "f1"), Decision::New);
    assert!(ledger.should_process(URL, "f1"));
}

#[test]
fn published_with_same_fingerprint_is_skipped() {
    let ledger = Ledger::from_records([record(ArticleStatus::Published, Some("f1"))]);
    assert_eq!(ledger.decide(URL, "f1"), Decision::Unchanged);
    assert!(!ledger.should_process(URL, "f1"));
}

#[test]
fn different_fingerprint_is_reprocessed() {
    let ledger = Ledger::from_records([record(ArticleStatus::Published, Some("f1"))]);
    assert_eq!(ledger.decide(URL, "f2"), Decision::Changed);
    assert!(ledger.should_process(URL, "f2"));
}

#[test]
fn failed_is_retried_even_when_unchanged() {
    let ledger = Ledger::from_records([record(ArticleStatus::Failed, Some("f1"))]);
    assert_eq!(ledger.decide(URL, "f1"), Decision::RetryFailed);
}

#[test]
fn interrupted_run_is_resumed() {
    for status in [
        ArticleStatus::Pending,
        ArticleStatus::Extracted,
        ArticleStatus::Translated,
    ] {
        let ledger = Ledger::from_records([record(status, Some("f1"))]);
        assert_eq!(ledger.decide(URL, "f1"), Decision::Interrupted, "{status}");
    }
}

#[test]
fn staged_artifact_is_offered_only_after_translation_with_same_content() {
    let mut failed_in_publish = record(ArticleStatus::Failed, Some("f1"));
    failed_in_publish.failed_stage = Some(ArticleStatus::Translated);
    failed_in_publish.staged_artifact = Some(".republish/staged/u1.md".to_string());
    let ledger = Ledger::from_records([failed_in_publish.clone()]);

    assert_eq!(
        ledger.resumable_artifact(URL, "f1"),
        Some(".republish/staged/u1.md")
    );
    assert_eq!(ledger.resumable_artifact(URL, "f2"), None);

    let mut failed_in_translation = failed_in_publish;
    failed_in_translation.failed_stage = Some(ArticleStatus::Extracted);
    let ledger = Ledger::from_records([failed_in_translation]);
    assert_eq!(ledger.resumable_artifact(URL, "f1"), None);
}

#[test]
fn example_scenario_publish_skip_then_change() {
    let t = |s| Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, s).unwrap();
    let mut ledger = Ledger::new();

    // First run.
    assert!(ledger.should_process(URL, "f1"));
    ledger.begin_processing(URL, t(0));
    ledger
        .advance(URL, Transition::Extracted { fingerprint: "f1".into() }, t(1))
        .unwrap();
    ledger
        .advance(URL, Transition::Translated { staged_artifact: None }, t(2))
        .unwrap();
    ledger
        .advance(
            URL,
            Transition::Published {
                artifact_path: "posts/2025-01-15-example.md".into(),
            },
            t(3),
        )
        .unwrap();

    // Second run, unchanged.
    assert!(!ledger.should_process(URL, "f1"));

    // Third run, upstream edit.
    assert!(ledger.should_process(URL, "f2"));
    let record = ledger.begin_processing(URL, t(10));
    assert_eq!(record.status, ArticleStatus::Pending);
}
