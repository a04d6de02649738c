use super::types::{
    FileAttributesRecord, JobMediaRecord, PoolPolicy, VolumeRecord, VolumeUsage,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("volume `{0}` not found")]
    VolumeNotFound(String),
    #[error("volume `{0}` already exists")]
    DuplicateVolume(String),
    #[error("file record {0} not found")]
    FileNotFound(u64),
    #[error("no catalog transaction open for job {0}")]
    NoTransaction(u32),
    #[error("catalog snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("{0}")]
    Backend(String),
}

/// Selection query issued on behalf of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeQuery {
    pub job_id: u32,
    pub pool_id: u32,
    pub media_type: String,
    /// 1-based rank among candidates; 0 is treated as 1.
    pub index: u32,
}

/// Catalog operations the volume core depends on.
///
/// Every method that hands out a volume for appending (`find_next_volume`,
/// `find_recycled_volume`, `recycle_volume`, `create_volume`,
/// `claim_volume`) must do so atomically with respect to other jobs: a volume
/// claimed by one job is never returned to another until
/// [`CatalogStore::release_claims`] runs for the holder. A job holds at most
/// one claim; a new claim replaces the previous one.
pub trait CatalogStore: Send + Sync {
    /// Next volume in `Append` status for the pool and media type, ordered
    /// least recently written first.
    fn find_next_volume(&self, query: &VolumeQuery) -> Result<Option<VolumeRecord>, CatalogError>;

    /// A volume already in `Recycle` status.
    fn find_recycled_volume(
        &self,
        query: &VolumeQuery,
    ) -> Result<Option<VolumeRecord>, CatalogError>;

    /// Marks `Full`/`Used` volumes whose retention lapsed as `Purged` and drops
    /// their position records. Returns how many volumes were purged.
    fn prune_volumes(&self, pool: &PoolPolicy, now: u64) -> Result<usize, CatalogError>;

    /// Turns a `Purged` volume back into a `Recycle` one.
    fn recycle_volume(&self, query: &VolumeQuery) -> Result<Option<VolumeRecord>, CatalogError>;

    /// Inserts a new volume, claiming it for `job_id`.
    fn create_volume(&self, job_id: u32, record: VolumeRecord)
        -> Result<VolumeRecord, CatalogError>;

    fn count_pool_volumes(&self, pool_id: u32) -> Result<u32, CatalogError>;

    /// Claims a specific volume for `job_id`. Returns `false` when another job
    /// holds it.
    fn claim_volume(&self, job_id: u32, media_id: u32) -> Result<bool, CatalogError>;

    fn release_claims(&self, job_id: u32);

    fn get_volume(&self, name: &str) -> Result<Option<VolumeRecord>, CatalogError>;

    /// Replaces every mutable column of the named volume.
    fn update_volume(&self, record: &VolumeRecord) -> Result<(), CatalogError>;

    /// Applies reported usage to the stored row and returns the result.
    fn update_volume_usage(&self, usage: &VolumeUsage) -> Result<VolumeRecord, CatalogError>;

    fn create_job_media(&self, record: &JobMediaRecord) -> Result<u64, CatalogError>;

    fn job_media_for_job(&self, job_id: u32) -> Result<Vec<JobMediaRecord>, CatalogError>;

    /// Opens a transaction for the job unless one is already open.
    fn begin_transaction(&self, job_id: u32) -> Result<(), CatalogError>;

    fn commit_transaction(&self, job_id: u32) -> Result<(), CatalogError>;

    fn create_file_attributes(&self, record: &FileAttributesRecord) -> Result<u64, CatalogError>;

    fn add_file_digest(&self, file_id: u64, digest: &str) -> Result<(), CatalogError>;
}
