//! Integration tests for the control surface
//!
//! Requests ride the feed; responses and unsolicited events come back on
//! the outbound stream. These tests check the wire contract end to end
//! against a running engine.

use super::common::fixtures::{
    chat_url, gem_home_url, mutation, page_meta, request, request_with, sample_record,
};
use super::common::harness::TestTracker;
use gemwatch::control::{
    Outbound, OutboundEvent, ACTION_GET_PAGE_INFO, ACTION_INVALIDATE_LOG_CONFIG,
    ACTION_OPEN_HISTORY_PAGE,
};
use gemwatch::store::ConversationRecord;
use gemwatch::track::ReinitReason;
use gemwatch::util::LOG_CONFIG_KEY;
use gemwatch::TrackingStatus;
use serde_json::{json, Value};

/// Test that `getPageInfo` describes a plain chat page.
#[tokio::test]
async fn test_get_page_info_reports_chat_page() {
    let mut tracker = TestTracker::start();

    tracker.feed(mutation(&chat_url("live1"))).await;
    tracker.feed(request(1, ACTION_GET_PAGE_INFO)).await;

    match tracker.next_response().await {
        Outbound::Response {
            id,
            ok,
            data,
            error,
        } => {
            assert_eq!(id, json!(1));
            assert!(ok);
            assert_eq!(error, None);
            let data = data.expect("page info payload");
            assert_eq!(data["url"], json!(chat_url("live1")));
            assert_eq!(data["isGeminiChat"], json!(true));
            assert_eq!(data["isGem"], json!(false));
            assert_eq!(data["gemInfo"], Value::Null);
        }
        other => panic!("expected a response, got {other:?}"),
    }

    tracker.shutdown().await;
}

/// Test that `getPageInfo` on a Gem page includes the cached Gem name.
#[tokio::test]
async fn test_get_page_info_includes_gem_name() {
    let mut tracker = TestTracker::start();

    tracker
        .feed_all([
            mutation(&gem_home_url("gem42")),
            page_meta(None, Some("Writing Coach"), None),
            request(2, ACTION_GET_PAGE_INFO),
        ])
        .await;

    match tracker.next_response().await {
        Outbound::Response { ok, data, .. } => {
            assert!(ok);
            let data = data.expect("page info payload");
            assert_eq!(data["isGeminiChat"], json!(false));
            assert_eq!(data["isGem"], json!(true));
            assert_eq!(
                data["gemInfo"],
                json!({"gemId": "gem42", "name": "Writing Coach"})
            );
        }
        other => panic!("expected a response, got {other:?}"),
    }

    tracker.shutdown().await;
}

/// Test that an action the tracker doesn't know gets an error response
/// instead of silence.
#[tokio::test]
async fn test_unknown_action_gets_error_response() {
    let mut tracker = TestTracker::start();

    tracker.feed(request(9, "selfDestruct")).await;

    match tracker.next_response().await {
        Outbound::Response { id, ok, error, .. } => {
            assert_eq!(id, json!(9));
            assert!(!ok);
            let error = error.expect("error message");
            assert!(error.contains("unknown action: selfDestruct"), "got: {error}");
        }
        other => panic!("expected a response, got {other:?}"),
    }

    tracker.shutdown().await;
}

/// Test that `invalidateLogConfigCache` re-reads the level from storage
/// and reports what it applied.
#[tokio::test]
async fn test_invalidate_log_config_rereads_storage() {
    let mut tracker = TestTracker::start();

    tracker
        .store
        .set(LOG_CONFIG_KEY, json!({"level": "debug"}))
        .expect("failed to write log config");
    tracker.feed(request(4, ACTION_INVALIDATE_LOG_CONFIG)).await;

    match tracker.next_response().await {
        Outbound::Response { ok, data, .. } => {
            assert!(ok);
            assert_eq!(data, Some(json!({"level": "debug"})));
        }
        other => panic!("expected a response, got {other:?}"),
    }

    tracker.shutdown().await;
}

/// Test that committed storage writes surface as storageChanged events.
#[tokio::test]
async fn test_storage_writes_surface_as_events() {
    let mut tracker = TestTracker::start();
    // The first status proves the engine is up and subscribed to storage
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Waiting))
        .await;

    tracker
        .store
        .set("userPrefs", json!({"theme": "dark"}))
        .expect("failed to write");

    let event = tracker
        .wait_for_event(|e| matches!(e, OutboundEvent::StorageChanged(n) if n.key == "userPrefs"))
        .await;
    match event {
        OutboundEvent::StorageChanged(notice) => {
            assert_eq!(notice.old_value, None);
            assert_eq!(notice.new_value, Some(json!({"theme": "dark"})));
        }
        other => panic!("expected storageChanged, got {other:?}"),
    }

    tracker.shutdown().await;
}

/// Test that `openHistoryPage` exports into the requested directory and
/// reports the file it wrote.
#[tokio::test]
async fn test_open_history_page_exports_where_asked() {
    let mut tracker = TestTracker::start();
    tracker
        .history()
        .append(sample_record("seed1", "Seeded chat"))
        .expect("failed to seed history");

    let out = tracker.data_dir().join("exports");
    tracker
        .feed(request_with(
            5,
            ACTION_OPEN_HISTORY_PAGE,
            &[("out", json!(out.display().to_string()))],
        ))
        .await;

    let path = match tracker.next_response().await {
        Outbound::Response { ok, data, .. } => {
            assert!(ok);
            let data = data.expect("export payload");
            data["path"].as_str().expect("path string").to_string()
        }
        other => panic!("expected a response, got {other:?}"),
    };

    assert!(path.starts_with(out.display().to_string().as_str()), "got: {path}");
    let written: Vec<ConversationRecord> =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read export"))
            .expect("parse export");
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].chat_id.as_deref(), Some("seed1"));

    tracker.shutdown().await;
}

/// Test that a reinit nudge (the watchdog path) surfaces a
/// reattachRequested event so the embedder can re-establish the probe.
#[tokio::test]
async fn test_reinit_nudge_surfaces_reattach_event() {
    let mut tracker = TestTracker::start();

    tracker.handle.request_reinit(ReinitReason::WatchLost);

    let event = tracker
        .wait_for_event(|e| matches!(e, OutboundEvent::ReattachRequested { .. }))
        .await;
    match event {
        OutboundEvent::ReattachRequested { reason } => assert_eq!(reason, "watchLost"),
        other => panic!("expected reattachRequested, got {other:?}"),
    }

    tracker.shutdown().await;
}
