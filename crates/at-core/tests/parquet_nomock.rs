//! No-mock engine tests on the Parquet store.
//!
//! Records written by one engine instance must be readable by the next one
//! opened on the same directory, with versions resolved across part files.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use at_common::Value;
use at_config::AuditConfig;
use at_core::{AuditApi, AuditDao};
use at_store::{Filter, ParquetGateway, Query};
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> AuditConfig {
    let mut config = AuditConfig::default();
    config.queue.capacity = 50;
    config.queue.workers = 2;
    config.queue.worker_buffer_capacity = 10;
    config.queue.wait_ms = 5;
    config.reserve.path = dir.path().join("reserve.jsonl");
    config
}

fn open(dir: &TempDir) -> AuditApi {
    let gateway = Arc::new(ParquetGateway::open(dir.path().join("store")).expect("open store"));
    AuditApi::new(config_in(dir), gateway).expect("start engine")
}

fn stop(api: &AuditApi) {
    assert!(api.stop_audit(Duration::from_secs(10), Duration::from_secs(1)));
}

#[test]
fn test_records_survive_restart() {
    let dir = TempDir::new().unwrap();

    let api = open(&dir);
    let mut batch = api.batch();
    for id in 1..=3i64 {
        let value = format!("entry-{}", id);
        batch.save(&[&value as &dyn Any], &[("IdColumn", Value::Long(id))]);
    }
    assert!(batch.commit());
    drop(batch);
    stop(&api);
    assert_eq!(api.stats().stored, 3);
    drop(api);

    let api = open(&dir);
    assert_eq!(api.count(&Filter::All), 3);
    let records = api.load(&Query::new(Filter::eq("IdColumn", 2i64)), true);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].object::<String>(), Some(&"entry-2".to_string()));

    let mut batch = api.batch();
    batch.delete(&records);
    assert!(batch.commit());
    drop(batch);
    stop(&api);
    drop(api);

    let api = open(&dir);
    assert_eq!(api.count(&Filter::All), 2);
    assert!(api
        .load(&Query::new(Filter::eq("IdColumn", 2i64)), false)
        .is_empty());
    assert!(!dir.path().join("reserve.jsonl").exists());
    stop(&api);
}

#[test]
fn test_dao_counts_without_engine() {
    let dir = TempDir::new().unwrap();
    let api = open(&dir);
    let mut batch = api.batch();
    for id in [10i64, 11, 10] {
        let value = id;
        batch.save(&[&value as &dyn Any], &[("IdColumn", Value::Long(id))]);
    }
    assert!(batch.commit());
    drop(batch);
    stop(&api);
    drop(api);

    let gateway = Arc::new(ParquetGateway::open(dir.path().join("store")).unwrap());
    let dao = AuditDao::open(gateway, &config_in(&dir).storage).unwrap();
    assert_eq!(dao.count_records(&Filter::All).unwrap(), 2);
    assert_eq!(
        dao.count_records(&Filter::eq("IdColumn", 10i64)).unwrap(),
        1
    );
}
