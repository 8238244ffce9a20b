//! Integration tests for the snapshot pipeline.

use kdb_snapshot::codec::{extract_section, SectionName};
use kdb_snapshot::{
    read_snapshot, CollectionRecord, LoadOutcome, Phase, SnapshotConfig, SnapshotService, Store,
    WriteDurability, WriteOutcome,
};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir) -> SnapshotConfig {
    SnapshotConfig::new(dir.path().join("kdb.snapshot")).with_save_period_ms(60_000)
}

fn seed(service: &SnapshotService) {
    let mut store = service.store().write();
    store
        .add_collection(
            CollectionRecord::new("users").with_schema(json!({"name": "string", "age": "number"})),
        )
        .unwrap();
    store.add_collection(CollectionRecord::new("posts")).unwrap();
    store.record_command("users:1", r#"{"name":"ada","age":36}"#).unwrap();
    store.record_command("users:2", r#"{"name":"alan"}"#).unwrap();
    store.record_command("posts:1", r#"{"title":"hello"}"#).unwrap();
    store.record_command("users:1", r#"{"name":"ada","age":37}"#).unwrap();
}

// --- Realistic Workflow Tests ---

#[test]
fn test_round_trip_through_service() {
    let dir = TempDir::new().unwrap();

    {
        let (service, outcome) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
        assert!(matches!(outcome, LoadOutcome::Bootstrapped(_)));
        seed(&service);
        assert!(service.snapshot_now().unwrap().is_written());
    }

    let (service, outcome) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
    let LoadOutcome::Loaded { info, points, collections } = outcome else {
        panic!("expected a load");
    };
    assert_eq!(points, 3);
    assert_eq!(collections, 2);
    assert_eq!(info.point_count, 3);

    let store = service.store().read();
    assert_eq!(store.get("users:1"), Some(r#"users:1<-KC->{"name":"ada","age":37}"#));
    assert_eq!(store.get("users:2"), Some(r#"users:2<-KC->{"name":"alan"}"#));
    assert_eq!(store.collection_ids(), ["users", "posts"]);
    assert!(store.validate("users", &json!({"name": "grace"})).is_ok());
    assert!(store.validate("users", &json!({"name": 1})).is_err());
}

#[test]
fn test_round_trip_preserves_table_and_collections() {
    let dir = TempDir::new().unwrap();
    let (service, _) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
    seed(&service);
    service.snapshot_now().unwrap();

    let original_table = service.store().read().table().clone();
    let original_collections = service.store().read().collections().to_vec();
    drop(service);

    let fresh = Store::shared();
    SnapshotService::open(config(&dir), fresh.clone()).unwrap();

    let fresh = fresh.read();
    assert_eq!(fresh.table(), &original_table);
    assert_eq!(fresh.collections(), original_collections.as_slice());
}

#[test]
fn test_last_write_wins_from_raw_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kdb.snapshot");
    let content = concat!(
        "--KDB-INFO-START--\r\n",
        r#"{"version":"1.0.0","id":"kdb-primary-1","path":"x","#,
        r#""snapshotTime":"2024-01-01T00:00:00.000Z","#,
        r#""collectionCount":0,"pointCount":2,"byteSize":60}"#,
        "--KDB-INFO-END--\r\n",
        "--KDB-DATA-START--\r\n",
        "a<-KC->1<-KCOMMAND->b<-KC->2<-KCOMMAND->a<-KC->3<-KCOMMAND->",
        "--KDB-DATA-END--\r\n",
        "--KDB-COLLECTIONS-START--\r\n",
        "[]",
        "--KDB-COLLECTIONS-END--\r\n",
    );
    fs::write(&path, content).unwrap();

    let (service, _) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
    let store = service.store().read();

    assert_eq!(store.point_count(), 2);
    assert_eq!(store.get("a"), Some("a<-KC->3"));
    assert_eq!(store.get("b"), Some("b<-KC->2"));
}

#[test]
fn test_bootstrap_creates_empty_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kdb.snapshot");
    assert!(!path.exists());

    let (_service, outcome) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
    assert!(matches!(outcome, LoadOutcome::Bootstrapped(_)));

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(extract_section(&content, SectionName::Data).unwrap(), "");
    assert_eq!(extract_section(&content, SectionName::Collections).unwrap(), "[]");

    let file = read_snapshot(&path).unwrap();
    assert_eq!(file.info.collection_count, 0);
    assert_eq!(file.info.point_count, 0);
    assert_eq!(file.info.byte_size, 0);
    assert_eq!(file.info.version, "1.0.0");
}

#[test]
fn test_write_while_writing_is_noop() {
    let dir = TempDir::new().unwrap();
    let (service, _) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
    seed(&service);
    service.snapshot_now().unwrap();
    let path = service.config().path.clone();
    let on_disk = fs::read(&path).unwrap();

    service.store().write().record_command("late", "1").unwrap();

    // Hold the writer slot as an in-flight write would.
    let guard = Arc::clone(service.guard());
    let ticket = guard.try_claim(Phase::Writing).unwrap();
    assert_eq!(service.snapshot_now().unwrap(), WriteOutcome::Skipped(Phase::Writing));
    assert_eq!(fs::read(&path).unwrap(), on_disk);

    drop(ticket);
    assert!(service.snapshot_now().unwrap().is_written());
    assert_ne!(fs::read(&path).unwrap(), on_disk);
}

#[test]
fn test_load_write_load_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kdb.snapshot");

    {
        let (service, _) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
        seed(&service);
        service.snapshot_now().unwrap();
    }

    let first = {
        let (service, _) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
        service.snapshot_now().unwrap();
        fs::read_to_string(&path).unwrap()
    };
    let second = {
        let (service, _) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
        service.snapshot_now().unwrap();
        fs::read_to_string(&path).unwrap()
    };

    assert_eq!(
        extract_section(&first, SectionName::Data).unwrap(),
        extract_section(&second, SectionName::Data).unwrap()
    );
    assert_eq!(
        extract_section(&first, SectionName::Collections).unwrap(),
        extract_section(&second, SectionName::Collections).unwrap()
    );
}

#[test]
fn test_in_place_durability_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir).with_durability(WriteDurability::InPlace);

    {
        let (service, _) = SnapshotService::open(config.clone(), Store::shared()).unwrap();
        seed(&service);
        service.snapshot_now().unwrap();
    }

    let (service, _) = SnapshotService::open(config, Store::shared()).unwrap();
    assert_eq!(service.store().read().point_count(), 3);
}

#[test]
fn test_last_snapshot_tracks_writes() {
    let dir = TempDir::new().unwrap();
    let (service, outcome) = SnapshotService::open(config(&dir), Store::shared()).unwrap();
    let LoadOutcome::Bootstrapped(bootstrap) = outcome else {
        panic!("expected bootstrap");
    };
    assert_eq!(service.last_snapshot(), Some(bootstrap));

    seed(&service);
    let WriteOutcome::Written(info) = service.snapshot_now().unwrap() else {
        panic!("expected a write");
    };
    assert_eq!(service.last_snapshot(), Some(info));
}
