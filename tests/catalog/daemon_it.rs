use std::fs;
use tempfile::TempDir;
use volstream::catalog::{CatalogError, CatalogStore, VolumeStatus};
use volstream::config::{load_config, ConfigError};
use volstream::daemon::Daemon;
use volstream::dispatcher::CatalogDispatcher;
use volstream::job::JobKind;
use volstream::protocol::CatalogResponse;
use volstream::util::VolstreamError;

const UNKNOWN_FIELD: &str = r#"
pools:
  - name: Default
    retention_days: 30
"#;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("catalogd.yaml");
    fs::write(&path, body).expect("write config");
    path
}

const GOOD: &str = r#"
media_type: File
catalog_snapshot: catalog.json
pools:
  - name: Default
    max_volume_bytes: 1m
jobs:
  - id: 7
    name: nightly.7
    pool: Default
  - id: 8
    name: restore.8
    kind: restore
    pool: Default
volumes:
  - name: Vol0001
    pool: Default
  - name: Vol0002
    pool: Default
    status: Full
    slot: 2
"#;

#[test]
fn unknown_config_fields_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, UNKNOWN_FIELD);
    assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
}

#[test]
fn bootstrap_seeds_volumes_and_registers_jobs() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&write_config(&dir, GOOD)).unwrap();
    let daemon = Daemon::bootstrap(&config).unwrap();

    assert_eq!(daemon.jobs.len(), 2);
    assert_eq!(
        daemon.jobs.get("restore.8").unwrap().lock().kind,
        JobKind::Restore
    );
    let volumes = daemon.catalog.volumes();
    assert_eq!(volumes.len(), 2);
    let full = volumes.iter().find(|v| v.volume_name == "Vol0002").unwrap();
    assert_eq!(full.status, VolumeStatus::Full);
    assert_eq!(full.slot, 2);
    assert_eq!(full.vol_max_bytes, 1024 * 1024);

    let dispatcher = CatalogDispatcher::new(daemon.context.clone());
    let job = daemon.jobs.get("nightly.7").unwrap();
    let request = b"CatReq Job=nightly.7 FindMedia=1\n";
    let reply = dispatcher.handle_message(&mut job.lock(), request, 0);
    let Some(CatalogResponse::Volume(info)) = reply else {
        panic!("expected a volume");
    };
    assert_eq!(info.volume_name, "Vol0001");
}

#[test]
fn snapshot_is_reloaded_instead_of_reseeding() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, GOOD);
    let config = load_config(&path).unwrap();
    {
        let daemon = Daemon::bootstrap(&config).unwrap();
        let mut changed = daemon.catalog.volumes()[0].clone();
        changed.status = VolumeStatus::Used;
        daemon.catalog.update_volume(&changed).unwrap();
        daemon.save_snapshot().unwrap();
    }
    assert!(dir.path().join("catalog.json").exists());

    let daemon = Daemon::bootstrap(&config).unwrap();
    let volumes = daemon.catalog.volumes();
    assert_eq!(volumes.len(), 2);
    assert!(volumes
        .iter()
        .any(|v| v.volume_name == "Vol0001" && v.status == VolumeStatus::Used));
}

#[test]
fn jobs_must_name_a_configured_pool() {
    let dir = TempDir::new().unwrap();
    let body = "pools: [{name: Default}]\njobs: [{id: 1, name: lost.1, pool: Elsewhere}]\n";
    let path = write_config(&dir, body);
    assert!(matches!(
        load_config(&path),
        Err(ConfigError::UnknownPool(pool)) if pool == "Elsewhere"
    ));
}

#[test]
fn corrupt_snapshot_fails_bootstrap() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, GOOD);
    fs::write(dir.path().join("catalog.json"), b"{ not json").unwrap();
    let config = load_config(&path).unwrap();

    let err = Daemon::bootstrap(&config).err().expect("bootstrap must fail");
    assert!(matches!(
        err,
        VolstreamError::Catalog(CatalogError::Snapshot(_))
    ));
}
