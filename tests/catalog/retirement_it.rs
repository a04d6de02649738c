use super::catalog_support::{backup_job, default_pool, CatalogFixture};
use std::sync::Arc;
use volstream::catalog::{VolumeStatus, VolumeUsage};
use volstream::job::{JobContext, JobKind};
use volstream::protocol::{CatalogRequest, CatalogResponse};

fn update_line(job: &JobContext, usage: VolumeUsage) -> Vec<u8> {
    CatalogRequest::UpdateMedia {
        job: job.job_name.clone(),
        usage,
    }
    .render()
    .into_bytes()
}

fn usage(volume: &str, jobs: u32, bytes: u64, max_bytes: u64) -> VolumeUsage {
    VolumeUsage {
        volume_name: volume.into(),
        vol_jobs: jobs,
        vol_files: 1,
        vol_blocks: 10,
        vol_bytes: bytes,
        vol_writes: 3,
        vol_max_bytes: max_bytes,
        end_time: 2_000,
        status: VolumeStatus::Append,
        ..VolumeUsage::default()
    }
}

#[test]
fn full_capacity_wins_over_job_count() {
    let fixture = CatalogFixture::with_volumes(&["Vol0001"]);
    let dispatcher = fixture.dispatcher();
    let mut pool = default_pool();
    pool.max_volume_jobs = 1;
    let mut job = backup_job(1, pool);

    let line = update_line(&job, usage("Vol0001", 1, 500, 500));
    let reply = dispatcher.handle_message(&mut job, &line, 2_000);

    assert_eq!(reply, Some(CatalogResponse::Updated));
    let volume = fixture.volume("Vol0001");
    assert_eq!(volume.status, VolumeStatus::Full);
    assert_eq!(volume.vol_bytes, 500);
    assert!(fixture.sink.contains("Marking Volume \"Vol0001\" as Full"));
    assert!(!fixture.sink.contains("Max Volume jobs exceeded"));
}

#[test]
fn capacity_message_groups_byte_counts() {
    let fixture = CatalogFixture::with_volumes(&["Vol0001"]);
    let dispatcher = fixture.dispatcher();
    let mut job = backup_job(1, default_pool());

    let line = update_line(&job, usage("Vol0001", 1, 5_368_709_120, 5_000_000_000));
    dispatcher.handle_message(&mut job, &line, 2_000);

    assert_eq!(fixture.volume("Vol0001").status, VolumeStatus::Full);
    assert!(fixture
        .sink
        .contains("Max Volume bytes exceeded (5,368,709,120 of 5,000,000,000 bytes)"));
}

#[test]
fn job_count_retires_when_capacity_remains() {
    let fixture = CatalogFixture::with_volumes(&["Vol0001"]);
    let dispatcher = fixture.dispatcher();
    let mut pool = default_pool();
    pool.max_volume_jobs = 2;
    let mut job = backup_job(1, pool);

    let line = update_line(&job, usage("Vol0001", 2, 100, 500));
    dispatcher.handle_message(&mut job, &line, 2_000);

    assert_eq!(fixture.volume("Vol0001").status, VolumeStatus::Used);
    assert!(fixture.sink.contains("Max Volume jobs exceeded (2)"));
}

#[test]
fn use_once_pool_marks_written_volume_used() {
    let fixture = CatalogFixture::with_volumes(&["Vol0001"]);
    let dispatcher = fixture.dispatcher();
    let mut pool = default_pool();
    pool.use_volume_once = true;
    let mut job = backup_job(1, pool);

    let line = update_line(&job, usage("Vol0001", 1, 64, 0));
    let reply = dispatcher.handle_message(&mut job, &line, 2_000);

    assert_eq!(reply, Some(CatalogResponse::Updated));
    assert_eq!(fixture.volume("Vol0001").status, VolumeStatus::Used);
    assert!(fixture.sink.contains("Volume used once"));
}

#[test]
fn restore_jobs_never_retire_volumes() {
    let fixture = CatalogFixture::with_volumes(&["Vol0001"]);
    let dispatcher = fixture.dispatcher();
    let mut pool = default_pool();
    pool.use_volume_once = true;
    let mut job = JobContext::new(4, "restore.4", JobKind::Restore, Arc::new(pool), "File");

    let line = update_line(&job, usage("Vol0001", 1, 64, 64));
    dispatcher.handle_message(&mut job, &line, 2_000);

    let volume = fixture.volume("Vol0001");
    assert_eq!(volume.status, VolumeStatus::Append);
    assert_eq!(volume.vol_bytes, 64);
    assert!(fixture.sink.messages().is_empty());
}
