//! Integration tests for the command-line surface
//!
//! These drive the real binary: import/export round trips, and a full
//! run-with-tape followed by a replay into a second data dir.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

use super::common::fixtures::{
    chat_url, conversation_list, mutation, page_meta, sample_record, send_click, APP_ROOT,
    SAMPLE_EXPORT,
};

/// The binary, pointed at an isolated data dir.
fn gemwatch(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gemwatch").expect("gemwatch binary should be built");
    cmd.arg("--data-dir").arg(data_dir);
    cmd
}

fn read_history_blob(data_dir: &Path) -> Value {
    let raw = fs::read_to_string(data_dir.join("storage.json")).expect("storage blob");
    let blob: Value = serde_json::from_str(&raw).expect("storage blob is JSON");
    blob["conversationHistory"].clone()
}

/// Test import followed by export: everything imported comes back out,
/// and re-importing the same file adds nothing.
#[test]
fn test_import_then_export_round_trip() {
    let data = TempDir::new().expect("temp dir");
    let file = data.path().join("incoming.json");
    fs::write(&file, SAMPLE_EXPORT.as_str()).expect("write import file");

    gemwatch(data.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 2 of 2 records (0 skipped)"));

    // The same conversations again: merge skips them all
    gemwatch(data.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 0 of 2 records (2 skipped)"));

    let backups = data.path().join("backups");
    let assert = gemwatch(data.path())
        .arg("export")
        .arg("--out")
        .arg(&backups)
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    let exported = PathBuf::from(stdout.trim());
    assert!(exported.starts_with(&backups), "got: {}", exported.display());

    let records: Vec<Value> =
        serde_json::from_str(&fs::read_to_string(&exported).expect("read export"))
            .expect("parse export");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["chatId"], "trip42");
    assert_eq!(records[1]["chatId"], "rust77");
}

/// Test that `import --replace` drops what was stored before.
#[test]
fn test_import_replace_drops_existing() {
    let data = TempDir::new().expect("temp dir");
    let first = data.path().join("first.json");
    fs::write(&first, SAMPLE_EXPORT.as_str()).expect("write import file");
    gemwatch(data.path())
        .arg("import")
        .arg(&first)
        .assert()
        .success();

    let second = data.path().join("second.json");
    let solo = vec![sample_record("solo9", "The only one")];
    fs::write(&second, serde_json::to_string_pretty(&solo).expect("serialize"))
        .expect("write import file");
    gemwatch(data.path())
        .arg("import")
        .arg(&second)
        .arg("--replace")
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 1 of 1 records (0 skipped)"));

    let history = read_history_blob(data.path());
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    assert_eq!(history[0]["chatId"], "solo9");
}

/// Test that a malformed import file fails loudly and cleanly.
#[test]
fn test_import_rejects_malformed_file() {
    let data = TempDir::new().expect("temp dir");
    let file = data.path().join("broken.json");
    fs::write(&file, "{\"not\": \"an array\"}").expect("write import file");

    gemwatch(data.path())
        .arg("import")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to import history"));
}

/// Test the full loop: run a scripted feed while recording a tape, then
/// replay the tape into a fresh data dir and get the same conversation.
#[test]
fn test_run_records_tape_and_replay_reproduces() {
    let work = TempDir::new().expect("temp dir");
    let feed_path = work.path().join("session.jsonl");
    let tape_path = work.path().join("session.tape");

    let mut feed = String::new();
    for line in [
        mutation(APP_ROOT),
        page_meta(Some("2.5 Flash"), None, Some("Gemini")),
        send_click(),
    ] {
        feed.push_str(&serde_json::to_string(&line).expect("serialize feed line"));
        feed.push('\n');
    }
    // A probe glitch mid-session; the tracker skips it, the tape keeps it
    feed.push_str("definitely not json\n");
    for line in [
        mutation(&chat_url("trip42")),
        conversation_list(&[("trip42", "Trip planning")]),
    ] {
        feed.push_str(&serde_json::to_string(&line).expect("serialize feed line"));
        feed.push('\n');
    }
    fs::write(&feed_path, feed).expect("write feed file");

    let live_data = TempDir::new().expect("temp dir");
    gemwatch(live_data.path())
        .arg("run")
        .arg("--feed")
        .arg(&feed_path)
        .arg("--record")
        .arg(&tape_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""phase":"saved""#));

    let history = read_history_blob(live_data.path());
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    assert_eq!(history[0]["chatId"], "trip42");
    assert_eq!(history[0]["title"], "Trip planning");
    assert_eq!(history[0]["model"], "2.5 Flash");

    // Same session, different machine: the tape alone reproduces it
    let replay_data = TempDir::new().expect("temp dir");
    gemwatch(replay_data.path())
        .arg("replay")
        .arg(&tape_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""phase":"saved""#));

    let replayed = read_history_blob(replay_data.path());
    assert_eq!(replayed.as_array().map(Vec::len), Some(1));
    assert_eq!(replayed[0]["chatId"], "trip42");
    assert_eq!(replayed[0]["title"], "Trip planning");
}

/// Test that a missing feed file is reported as a run failure.
#[test]
fn test_run_reports_missing_feed() {
    let data = TempDir::new().expect("temp dir");

    gemwatch(data.path())
        .arg("run")
        .arg("--feed")
        .arg(data.path().join("absent.jsonl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("feed reader failed"));
}
