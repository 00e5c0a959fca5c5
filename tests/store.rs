// ABOUTME: Integration tests for the file-backed service state store.
// ABOUTME: Records survive save/load, list in name order, and corrupt files are reported.

mod support;

use cutover::error::Error;
use cutover::store::{ServiceRecord, StateStore};
use cutover::types::{Color, DeploymentId, RequestId};
use support::{endpoints, service};

/// Test: Loading a service that was never deployed returns nothing.
#[test]
fn missing_record_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    assert!(store.load(&service("feed")).unwrap().is_none());
    assert!(store.list().unwrap().is_empty());
}

/// Test: A saved record loads back unchanged.
#[test]
fn saved_record_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());

    let mut record = ServiceRecord::new(service("feed"), Color::Green, endpoints(Color::Green));
    record.live_version = Some("ghcr.io/acme/feed:v2".into());
    record.last_deployment = Some(DeploymentId::new("dep-1"));
    record.last_request = Some(RequestId::new("pipeline-42"));
    store.save(&record).unwrap();

    assert_eq!(store.load(&service("feed")).unwrap(), Some(record));
}

/// Test: Saving again replaces the previous record.
#[test]
fn save_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());

    store
        .save(&ServiceRecord::new(service("feed"), Color::Blue, endpoints(Color::Blue)))
        .unwrap();
    store
        .save(&ServiceRecord::new(service("feed"), Color::Green, endpoints(Color::Green)))
        .unwrap();

    let loaded = store.load(&service("feed")).unwrap().unwrap();
    assert_eq!(loaded.active, Color::Green);
    assert_eq!(store.list().unwrap().len(), 1);
}

/// Test: List returns every record sorted by service name.
#[test]
fn list_is_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());

    for name in ["search", "api", "feed"] {
        store
            .save(&ServiceRecord::new(service(name), Color::Blue, Vec::new()))
            .unwrap();
    }

    let names: Vec<String> = store
        .list()
        .unwrap()
        .into_iter()
        .map(|r| r.service.to_string())
        .collect();
    assert_eq!(names, vec!["api", "feed", "search"]);
}

/// Test: A corrupt record is an error, not silently treated as missing.
#[test]
fn corrupt_record_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    std::fs::create_dir_all(dir.path().join("services")).unwrap();
    std::fs::write(dir.path().join("services/feed.json"), "{").unwrap();

    let err = store.load(&service("feed")).unwrap_err();
    assert!(matches!(err, Error::State(_)));
}
