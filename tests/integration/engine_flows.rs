//! Integration tests for the capture pipeline
//!
//! Each test runs a full engine against a scripted probe feed and checks
//! the resulting statuses and stored records.

use super::common::fixtures::{
    chat_url, conversation_list, gem_chat_url, gem_home_url, mutation, page_meta, request,
    send_click, stray_click, visibility, APP_ROOT,
};
use super::common::harness::TestTracker;
use chrono::DateTime;
use gemwatch::control::ACTION_GET_PAGE_INFO;
use gemwatch::store::GemInfo;
use gemwatch::TrackingStatus;

/// Test the whole happy path: a send on the new-chat page, the chat URL
/// materializing, and a list snapshot supplying the title.
#[tokio::test]
async fn test_send_from_new_chat_page_records_conversation() {
    let mut tracker = TestTracker::start();
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Waiting))
        .await;

    tracker
        .feed_all([
            mutation(APP_ROOT),
            page_meta(Some("2.5 Flash"), None, Some("Gemini")),
            send_click(),
        ])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Pending))
        .await;

    tracker
        .feed_all([
            mutation(&chat_url("trip42")),
            // The fresh chat is not the first row of the sidebar
            conversation_list(&[("old1", "Older chat"), ("trip42", "Trip planning")]),
        ])
        .await;
    let status = tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Saved { .. }))
        .await;
    assert_eq!(status, TrackingStatus::Saved { total: 1 });

    let records = tracker.history().load().expect("history");
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.chat_id.as_deref(), Some("trip42"));
    assert_eq!(record.title.as_deref(), Some("Trip planning"));
    assert_eq!(record.model, "2.5 Flash");
    assert_eq!(record.url.as_deref(), Some(chat_url("trip42").as_str()));
    assert!(record.id.is_some());
    assert!(record.gem.is_none());
    assert!(
        DateTime::parse_from_rfc3339(&record.timestamp).is_ok(),
        "timestamp should be RFC 3339: {}",
        record.timestamp
    );

    tracker.shutdown().await;
}

/// Test that a capture inside a Gem carries the Gem's identity, including
/// the display name scraped from the page.
#[tokio::test]
async fn test_gem_capture_carries_gem_identity() {
    let mut tracker = TestTracker::start();

    tracker
        .feed_all([
            mutation(&gem_home_url("gem42")),
            page_meta(Some("2.5 Pro"), Some("Writing Coach"), None),
            send_click(),
        ])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Pending))
        .await;

    tracker
        .feed_all([
            mutation(&gem_chat_url("gem42", "chat77")),
            conversation_list(&[("chat77", "Plot outline")]),
        ])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Saved { .. }))
        .await;

    let records = tracker.history().load().expect("history");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chat_id.as_deref(), Some("chat77"));
    assert_eq!(
        records[0].gem,
        Some(GemInfo {
            gem_id: Some("gem42".to_string()),
            name: Some("Writing Coach".to_string()),
        })
    );

    tracker.shutdown().await;
}

/// Test that sends inside an existing chat are left alone: the tracker
/// just keeps tracking and nothing is recorded.
#[tokio::test]
async fn test_send_inside_existing_chat_is_not_captured() {
    let mut tracker = TestTracker::start();

    tracker
        .feed_all([
            mutation(&chat_url("live1")),
            send_click(),
            conversation_list(&[("live1", "Live chat")]),
        ])
        .await;
    let status = tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Tracking))
        .await;
    assert_eq!(status, TrackingStatus::Tracking);

    let history = tracker.history();
    tracker.shutdown().await;
    assert!(history.load().expect("history").is_empty());
}

/// Test that clicks that are not the send button never start a capture.
#[tokio::test]
async fn test_stray_clicks_are_ignored() {
    let mut tracker = TestTracker::start();

    tracker
        .feed_all([
            mutation(APP_ROOT),
            stray_click("a.sidebar-link"),
            stray_click("button.settings"),
            conversation_list(&[("old1", "Older chat")]),
        ])
        .await;
    // The list snapshot confirms readiness; no capture ever started
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Tracking))
        .await;

    let history = tracker.history();
    tracker.shutdown().await;
    assert!(history.load().expect("history").is_empty());
}

/// Test that navigating somewhere unrelated while a capture is pending
/// cancels it with a visible warning, and that the engine stays torn down
/// until something re-initializes it.
#[tokio::test]
async fn test_unrelated_navigation_abandons_pending_capture() {
    let mut tracker = TestTracker::start();

    tracker
        .feed_all([mutation(APP_ROOT), send_click()])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Pending))
        .await;

    tracker
        .feed(mutation("https://gemini.google.com/faq"))
        .await;
    let status = tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Cancelled { .. }))
        .await;
    match status {
        TrackingStatus::Cancelled { warning } => {
            assert!(warning.contains("was not recorded"), "got: {warning}");
            assert!(warning.contains("/faq"), "got: {warning}");
        }
        other => panic!("expected cancelled, got {other:?}"),
    }

    // Torn down: a fresh send click goes nowhere. The request is a
    // sync barrier; its response proves the click was processed.
    tracker
        .feed_all([
            mutation(APP_ROOT),
            send_click(),
            request(1, ACTION_GET_PAGE_INFO),
        ])
        .await;
    tracker.next_response().await;
    assert!(matches!(
        tracker.handle.status(),
        TrackingStatus::Cancelled { .. }
    ));

    let history = tracker.history();
    tracker.shutdown().await;
    assert!(history.load().expect("history").is_empty());
}

/// Test that the tab becoming visible again re-initializes the watches,
/// recovering from an earlier teardown.
#[tokio::test]
async fn test_visibility_change_recovers_tracking() {
    let mut tracker = TestTracker::start();

    // Tear down by navigating somewhere unrelated
    tracker
        .feed_all([
            mutation(APP_ROOT),
            conversation_list(&[("old1", "Older chat")]),
        ])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Tracking))
        .await;
    tracker
        .feed(mutation("https://gemini.google.com/settings"))
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Idle))
        .await;

    // The user wanders back to the new-chat page while nothing is
    // watching, then hides and re-shows the tab
    tracker.feed(mutation(APP_ROOT)).await;
    tracker.feed(visibility(false)).await;
    tracker.feed(visibility(true)).await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Waiting))
        .await;

    // And the revived watches work: a capture still goes through
    tracker
        .feed_all([
            send_click(),
            mutation(&chat_url("back9")),
            conversation_list(&[("back9", "After the nap")]),
        ])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Saved { .. }))
        .await;

    let records = tracker.history().load().expect("history");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chat_id.as_deref(), Some("back9"));

    tracker.shutdown().await;
}

/// Test that a feed ending with a capture still pending reports the chat
/// as lost rather than silently dropping it.
#[tokio::test]
async fn test_feed_eof_with_pending_capture_warns() {
    let mut tracker = TestTracker::start();

    tracker
        .feed_all([mutation(APP_ROOT), send_click()])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Pending))
        .await;

    let handle = tracker.handle.clone();
    tracker.shutdown().await;

    match handle.status() {
        TrackingStatus::Cancelled { warning } => {
            assert!(warning.contains("Feed ended"), "got: {warning}");
        }
        other => panic!("expected cancelled, got {other:?}"),
    }
}

/// Test that two captures in one session both land, with the running
/// total reflecting the second save.
///
/// Going back to the placeholder is an unrelated transition, so the
/// watches tear down between chats; the visibility change brings them
/// back, the same way the page does after a real navigation.
#[tokio::test]
async fn test_consecutive_captures_accumulate() {
    let mut tracker = TestTracker::start();

    tracker
        .feed_all([
            mutation(APP_ROOT),
            send_click(),
            mutation(&chat_url("first1")),
            conversation_list(&[("first1", "First")]),
        ])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Saved { total: 1 }))
        .await;

    // Back to the placeholder for another round
    tracker
        .feed_all([mutation(APP_ROOT), visibility(true)])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Waiting))
        .await;
    tracker
        .feed_all([
            send_click(),
            mutation(&chat_url("second2")),
            conversation_list(&[("second2", "Second"), ("first1", "First")]),
        ])
        .await;
    tracker
        .wait_for_status(|s| matches!(s, TrackingStatus::Saved { total: 2 }))
        .await;

    let records = tracker.history().load().expect("history");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].chat_id.as_deref(), Some("first1"));
    assert_eq!(records[1].chat_id.as_deref(), Some("second2"));

    tracker.shutdown().await;
}
