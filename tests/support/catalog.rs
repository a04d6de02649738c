#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use volstream::catalog::{
    CatalogError, CatalogStore, FileAttributesRecord, JobMediaRecord, MemoryCatalog, PoolPolicy,
    VolumeQuery, VolumeRecord, VolumeStatus, VolumeUsage,
};
use volstream::daemon::DaemonContext;
use volstream::dispatcher::CatalogDispatcher;
use volstream::job::{JobContext, JobKind};
use volstream::messages::MemorySink;

pub const MEDIA_TYPE: &str = "File";

pub struct CatalogFixture {
    pub catalog: Arc<MemoryCatalog>,
    pub sink: Arc<MemorySink>,
}

impl CatalogFixture {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(MemoryCatalog::new()),
            sink: Arc::new(MemorySink::new()),
        }
    }

    pub fn with_volumes(names: &[&str]) -> Self {
        let fixture = Self::new();
        for name in names {
            fixture.add_volume(name, VolumeStatus::Append);
        }
        fixture
    }

    pub fn add_volume(&self, name: &str, status: VolumeStatus) -> VolumeRecord {
        self.catalog
            .insert_volume(VolumeRecord::new(name, 1, MEDIA_TYPE).with_status(status))
            .expect("insert volume")
    }

    pub fn volume(&self, name: &str) -> VolumeRecord {
        self.catalog
            .get_volume(name)
            .expect("catalog lookup")
            .expect("volume exists")
    }

    pub fn context(&self) -> DaemonContext {
        DaemonContext::new(self.catalog.clone(), self.sink.clone())
    }

    pub fn dispatcher(&self) -> CatalogDispatcher {
        CatalogDispatcher::new(self.context())
    }
}

pub fn default_pool() -> PoolPolicy {
    PoolPolicy::new(1, "Default")
}

pub fn backup_job(job_id: u32, pool: PoolPolicy) -> JobContext {
    JobContext::new(
        job_id,
        format!("nightly.{job_id}"),
        JobKind::Backup,
        Arc::new(pool),
        MEDIA_TYPE,
    )
}

/// Hands out the same expired volume forever and accepts every update
/// without storing it.
pub struct StubbornStore {
    inner: MemoryCatalog,
    pub volume: VolumeRecord,
    pub updates: AtomicUsize,
}

impl StubbornStore {
    pub fn new(first_written: u64) -> Self {
        let mut volume = VolumeRecord::new("Stuck", 1, MEDIA_TYPE);
        volume.media_id = 1;
        volume.first_written = first_written;
        Self {
            inner: MemoryCatalog::new(),
            volume,
            updates: AtomicUsize::new(0),
        }
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl CatalogStore for StubbornStore {
    fn find_next_volume(&self, _query: &VolumeQuery) -> Result<Option<VolumeRecord>, CatalogError> {
        Ok(Some(self.volume.clone()))
    }

    fn find_recycled_volume(
        &self,
        query: &VolumeQuery,
    ) -> Result<Option<VolumeRecord>, CatalogError> {
        self.inner.find_recycled_volume(query)
    }

    fn prune_volumes(&self, pool: &PoolPolicy, now: u64) -> Result<usize, CatalogError> {
        self.inner.prune_volumes(pool, now)
    }

    fn recycle_volume(&self, query: &VolumeQuery) -> Result<Option<VolumeRecord>, CatalogError> {
        self.inner.recycle_volume(query)
    }

    fn create_volume(
        &self,
        job_id: u32,
        record: VolumeRecord,
    ) -> Result<VolumeRecord, CatalogError> {
        self.inner.create_volume(job_id, record)
    }

    fn count_pool_volumes(&self, pool_id: u32) -> Result<u32, CatalogError> {
        self.inner.count_pool_volumes(pool_id)
    }

    fn claim_volume(&self, _job_id: u32, _media_id: u32) -> Result<bool, CatalogError> {
        Ok(true)
    }

    fn release_claims(&self, job_id: u32) {
        self.inner.release_claims(job_id)
    }

    fn get_volume(&self, _name: &str) -> Result<Option<VolumeRecord>, CatalogError> {
        Ok(Some(self.volume.clone()))
    }

    fn update_volume(&self, _record: &VolumeRecord) -> Result<(), CatalogError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update_volume_usage(&self, usage: &VolumeUsage) -> Result<VolumeRecord, CatalogError> {
        let mut volume = self.volume.clone();
        volume.apply_usage(usage);
        Ok(volume)
    }

    fn create_job_media(&self, record: &JobMediaRecord) -> Result<u64, CatalogError> {
        self.inner.create_job_media(record)
    }

    fn job_media_for_job(&self, job_id: u32) -> Result<Vec<JobMediaRecord>, CatalogError> {
        self.inner.job_media_for_job(job_id)
    }

    fn begin_transaction(&self, job_id: u32) -> Result<(), CatalogError> {
        self.inner.begin_transaction(job_id)
    }

    fn commit_transaction(&self, job_id: u32) -> Result<(), CatalogError> {
        self.inner.commit_transaction(job_id)
    }

    fn create_file_attributes(&self, record: &FileAttributesRecord) -> Result<u64, CatalogError> {
        self.inner.create_file_attributes(record)
    }

    fn add_file_digest(&self, file_id: u64, digest: &str) -> Result<(), CatalogError> {
        self.inner.add_file_digest(file_id, digest)
    }
}
