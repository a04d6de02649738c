//! Per-job state shared between catalog request handling and streaming.

use crate::catalog::PoolPolicy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    #[default]
    Backup,
    Restore,
    Verify,
}

impl JobKind {
    /// Jobs of this kind append to volumes.
    pub fn writes(self) -> bool {
        matches!(self, JobKind::Backup)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Backup => f.write_str("backup"),
            JobKind::Restore => f.write_str("restore"),
            JobKind::Verify => f.write_str("verify"),
        }
    }
}

/// Job-level cancellation flag, cheap to clone into worker threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: u32,
    pub job_name: String,
    pub kind: JobKind,
    pub pool: Arc<PoolPolicy>,
    /// Media type of the storage resource assigned to the job.
    pub media_type: String,
    pub media_id: u32,
    pub volume_name: String,
    /// Catalog id of the last attribute record, for digest updates.
    pub file_id: u64,
    pub file_index: i32,
    pub error_count: u32,
    pub transaction_open: bool,
    pub cancel: CancelToken,
}

impl JobContext {
    pub fn new(
        job_id: u32,
        job_name: impl Into<String>,
        kind: JobKind,
        pool: Arc<PoolPolicy>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            job_name: job_name.into(),
            kind,
            pool,
            media_type: media_type.into(),
            media_id: 0,
            volume_name: String::new(),
            file_id: 0,
            file_index: 0,
            error_count: 0,
            transaction_open: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn pool_id(&self) -> u32 {
        self.pool.pool_id
    }

    pub fn assign_volume(&mut self, media_id: u32, volume_name: &str) {
        self.media_id = media_id;
        self.volume_name = volume_name.to_string();
    }
}

pub type SharedJob = Arc<Mutex<JobContext>>;

/// Jobs known to the coordinating daemon, looked up by name when a storage
/// daemon connection first identifies itself.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, SharedJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job: JobContext) -> SharedJob {
        let name = job.job_name.clone();
        let shared = Arc::new(Mutex::new(job));
        self.jobs.lock().insert(name, shared.clone());
        shared
    }

    pub fn get(&self, name: &str) -> Option<SharedJob> {
        self.jobs.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<SharedJob> {
        self.jobs.lock().remove(name)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every registered job.
    pub fn cancel_all(&self) {
        for job in self.jobs.lock().values() {
            job.lock().cancel.cancel();
        }
    }
}
