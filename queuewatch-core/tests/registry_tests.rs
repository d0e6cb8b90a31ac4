//! Registry persistence integration tests: error messages, atomic-write
//! safety, and full save/load cycles against `~/.queuewatch/monitors.json`.

use std::fs;

use chrono::Utc;
use queuewatch_core::{
    registry,
    types::{DifferenceRecord, MonitorConfig, MonitorId, SlugChange},
    Registry, StoreError,
};
use rstest::rstest;
use serde_json::json;

fn monitor(name: &str) -> MonitorConfig {
    MonitorConfig::new(name, "https://api.example.com/queues", None, None)
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_corrupt_json_returns_parse_error_with_path() {
    let home = tempfile::TempDir::new().expect("tempdir");
    let dir = home.path().join(".queuewatch");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("monitors.json"), b"{ not an array").expect("write");

    let err = registry::load_at(home.path()).unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("monitors.json"), "must contain file path, got: {msg}");
}

#[test]
fn load_wrong_shape_returns_parse_error() {
    let home = tempfile::TempDir::new().expect("tempdir");
    let dir = home.path().join(".queuewatch");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("monitors.json"), b"{\"an\": \"object\"}").expect("write");

    let err = registry::load_at(home.path()).unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Mutation persistence
// ---------------------------------------------------------------------------

#[test]
fn every_mutation_survives_a_reload() {
    let home = tempfile::TempDir::new().expect("tempdir");

    let mut reg = Registry::new();
    let id = reg.insert(monitor("main")).id.clone();
    registry::save_at(home.path(), &reg).expect("save after insert");

    reg.update(&id, |m| {
        m.last_snapshot = Some(json!({"name": "main", "slug": "v2"}));
        m.last_difference = Some(DifferenceRecord {
            name: Some("main".into()),
            url: "https://api.example.com/queues/v2".into(),
            slug_change: SlugChange {
                previous: Some("v1".into()),
                current: Some("v2".into()),
            },
            detected_at: Utc::now(),
        });
    })
    .expect("update");
    registry::save_at(home.path(), &reg).expect("save after update");

    let reloaded = registry::load_at(home.path()).expect("load");
    let entry = reloaded.get(&id).expect("entry");
    let difference = entry.last_difference.as_ref().expect("difference");
    assert_eq!(difference.slug_change.previous.as_deref(), Some("v1"));
    assert_eq!(difference.slug_change.current.as_deref(), Some("v2"));

    let mut reg = reloaded;
    reg.remove(&id).expect("remove");
    registry::save_at(home.path(), &reg).expect("save after remove");
    assert!(registry::load_at(home.path()).expect("load").is_empty());
}

#[test]
fn unknown_id_lookups_are_not_found() {
    let mut reg = Registry::new();
    reg.insert(monitor("main"));
    let missing = MonitorId::from("no-such-id");
    assert!(reg.get(&missing).is_none());
    assert!(matches!(
        reg.remove(&missing),
        Err(StoreError::MonitorNotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// 3. Roundtrip matrix
// ---------------------------------------------------------------------------

fn minimal() -> MonitorConfig {
    MonitorConfig::new("bare", "", None, None)
}

fn full() -> MonitorConfig {
    let mut m = MonitorConfig::new(
        "ticketed launch",
        "https://queue.example.com/status",
        Some("main-room".into()),
        Some(10),
    );
    m.is_running = true;
    m.last_snapshot = Some(json!({"name": "main-room", "slug": "wave-3"}));
    m.last_difference = Some(DifferenceRecord {
        name: Some("main-room".into()),
        url: "https://queue.example.com/status/wave-3".into(),
        slug_change: SlugChange {
            previous: Some("wave-2".into()),
            current: Some("wave-3".into()),
        },
        detected_at: Utc::now(),
    });
    m
}

#[rstest]
#[case::minimal(minimal())]
#[case::full(full())]
fn monitor_roundtrips_through_the_store(#[case] monitor: MonitorConfig) {
    let home = tempfile::TempDir::new().expect("tempdir");
    let mut reg = Registry::new();
    let id = reg.insert(monitor.clone()).id.clone();
    registry::save_at(home.path(), &reg).expect("save");

    let loaded = registry::load_at(home.path()).expect("load");
    assert_eq!(loaded.get(&id), Some(&monitor));
}
