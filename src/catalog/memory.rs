use super::store::{CatalogError, CatalogStore, VolumeQuery};
use super::types::{
    FileAttributesRecord, JobMediaRecord, PoolPolicy, VolumeRecord, VolumeStatus, VolumeUsage,
};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogState {
    volumes: Vec<VolumeRecord>,
    job_media: Vec<JobMediaRecord>,
    files: Vec<FileAttributesRecord>,
    next_media_id: u32,
    next_job_media_id: u64,
    next_file_id: u64,
    #[serde(skip)]
    claims: HashMap<u32, u32>,
    #[serde(skip)]
    pending_files: HashMap<u32, Vec<FileAttributesRecord>>,
}

impl CatalogState {
    fn claimed_by_other(&self, media_id: u32, job_id: u32) -> bool {
        self.claims
            .iter()
            .any(|(holder, media)| *media == media_id && *holder != job_id)
    }

    fn claim(&mut self, job_id: u32, media_id: u32) {
        self.claims.insert(job_id, media_id);
    }

    fn candidates(&self, query: &VolumeQuery, status: VolumeStatus) -> Vec<&VolumeRecord> {
        let mut found: Vec<&VolumeRecord> = self
            .volumes
            .iter()
            .filter(|volume| {
                volume.pool_id == query.pool_id
                    && volume.media_type == query.media_type
                    && volume.status == status
                    && !self.claimed_by_other(volume.media_id, query.job_id)
            })
            .collect();
        found.sort_by_key(|volume| (volume.last_written, volume.media_id));
        found
    }

    fn claim_candidate(&mut self, query: &VolumeQuery, status: VolumeStatus) -> Option<VolumeRecord> {
        let rank = query.index.max(1) as usize - 1;
        let chosen = self.candidates(query, status).get(rank).map(|v| (*v).clone())?;
        self.claim(query.job_id, chosen.media_id);
        Some(chosen)
    }

    fn insert(&mut self, mut record: VolumeRecord) -> Result<VolumeRecord, CatalogError> {
        if self
            .volumes
            .iter()
            .any(|volume| volume.volume_name == record.volume_name)
        {
            return Err(CatalogError::DuplicateVolume(record.volume_name));
        }
        if record.media_id == 0 {
            self.next_media_id += 1;
            record.media_id = self.next_media_id;
        } else {
            self.next_media_id = self.next_media_id.max(record.media_id);
        }
        self.volumes.push(record.clone());
        Ok(record)
    }

    fn volume_mut(&mut self, name: &str) -> Option<&mut VolumeRecord> {
        self.volumes.iter_mut().find(|volume| volume.volume_name == name)
    }

    fn file_mut(&mut self, file_id: u64) -> Option<&mut FileAttributesRecord> {
        if let Some(file) = self.files.iter_mut().find(|file| file.file_id == file_id) {
            return Some(file);
        }
        self.pending_files
            .values_mut()
            .flat_map(|pending| pending.iter_mut())
            .find(|file| file.file_id == file_id)
    }
}

/// Thread-safe in-memory catalog with optional JSON snapshots.
///
/// All operations serialize on one lock, which makes select-and-claim atomic
/// across concurrently selecting jobs.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot written by [`MemoryCatalog::save_snapshot`], or
    /// starts empty when the file does not exist.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            debug!("event=catalog_snapshot_missing path={}", path.display());
            return Ok(Self::new());
        }
        let raw = fs::read(path)?;
        let state: CatalogState = serde_json::from_slice(&raw)?;
        info!(
            "event=catalog_snapshot_loaded path={} volumes={} job_media={}",
            path.display(),
            state.volumes.len(),
            state.job_media.len()
        );
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Writes the durable part of the catalog (claims and uncommitted file
    /// records excluded) through a temporary file and rename.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), CatalogError> {
        let encoded = {
            let state = self.state.lock();
            serde_json::to_vec_pretty(&*state)?
        };
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        debug!("event=catalog_snapshot_saved path={}", path.display());
        Ok(())
    }

    /// Adds a provisioned volume; a zero `media_id` is assigned.
    pub fn insert_volume(&self, record: VolumeRecord) -> Result<VolumeRecord, CatalogError> {
        self.state.lock().insert(record)
    }

    pub fn volumes(&self) -> Vec<VolumeRecord> {
        self.state.lock().volumes.clone()
    }

    pub fn files_for_job(&self, job_id: u32) -> Vec<FileAttributesRecord> {
        self.state
            .lock()
            .files
            .iter()
            .filter(|file| file.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn claimed_volume(&self, job_id: u32) -> Option<u32> {
        self.state.lock().claims.get(&job_id).copied()
    }
}

impl CatalogStore for MemoryCatalog {
    fn find_next_volume(&self, query: &VolumeQuery) -> Result<Option<VolumeRecord>, CatalogError> {
        Ok(self.state.lock().claim_candidate(query, VolumeStatus::Append))
    }

    fn find_recycled_volume(
        &self,
        query: &VolumeQuery,
    ) -> Result<Option<VolumeRecord>, CatalogError> {
        Ok(self.state.lock().claim_candidate(query, VolumeStatus::Recycle))
    }

    fn prune_volumes(&self, pool: &PoolPolicy, now: u64) -> Result<usize, CatalogError> {
        let mut state = self.state.lock();
        let expired: Vec<u32> = state
            .volumes
            .iter()
            .filter(|volume| {
                volume.pool_id == pool.pool_id
                    && matches!(volume.status, VolumeStatus::Full | VolumeStatus::Used)
                    && volume.last_written > 0
                    && volume.last_written.saturating_add(pool.volume_retention) <= now
                    && !state.claims.values().any(|media| *media == volume.media_id)
            })
            .map(|volume| volume.media_id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        state
            .job_media
            .retain(|entry| !expired.contains(&entry.media_id));
        for volume in state.volumes.iter_mut() {
            if expired.contains(&volume.media_id) {
                volume.status = VolumeStatus::Purged;
            }
        }
        info!(
            "event=catalog_pruned pool={} volumes={}",
            pool.name,
            expired.len()
        );
        Ok(expired.len())
    }

    fn recycle_volume(&self, query: &VolumeQuery) -> Result<Option<VolumeRecord>, CatalogError> {
        let mut state = self.state.lock();
        let Some(media_id) = state
            .candidates(query, VolumeStatus::Purged)
            .first()
            .map(|volume| volume.media_id)
        else {
            return Ok(None);
        };
        let volume = state
            .volumes
            .iter_mut()
            .find(|volume| volume.media_id == media_id)
            .ok_or_else(|| CatalogError::Backend(format!("media id {media_id} vanished")))?;
        volume.reset_for_recycle();
        let recycled = volume.clone();
        state.claim(query.job_id, media_id);
        Ok(Some(recycled))
    }

    fn create_volume(
        &self,
        job_id: u32,
        record: VolumeRecord,
    ) -> Result<VolumeRecord, CatalogError> {
        let mut state = self.state.lock();
        let created = state.insert(record)?;
        state.claim(job_id, created.media_id);
        Ok(created)
    }

    fn count_pool_volumes(&self, pool_id: u32) -> Result<u32, CatalogError> {
        let state = self.state.lock();
        Ok(state
            .volumes
            .iter()
            .filter(|volume| volume.pool_id == pool_id)
            .count() as u32)
    }

    fn claim_volume(&self, job_id: u32, media_id: u32) -> Result<bool, CatalogError> {
        let mut state = self.state.lock();
        if state.claimed_by_other(media_id, job_id) {
            return Ok(false);
        }
        state.claim(job_id, media_id);
        Ok(true)
    }

    fn release_claims(&self, job_id: u32) {
        self.state.lock().claims.remove(&job_id);
    }

    fn get_volume(&self, name: &str) -> Result<Option<VolumeRecord>, CatalogError> {
        Ok(self
            .state
            .lock()
            .volumes
            .iter()
            .find(|volume| volume.volume_name == name)
            .cloned())
    }

    fn update_volume(&self, record: &VolumeRecord) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        let stored = state
            .volume_mut(&record.volume_name)
            .ok_or_else(|| CatalogError::VolumeNotFound(record.volume_name.clone()))?;
        let media_id = stored.media_id;
        *stored = record.clone();
        stored.media_id = media_id;
        Ok(())
    }

    fn update_volume_usage(&self, usage: &VolumeUsage) -> Result<VolumeRecord, CatalogError> {
        let mut state = self.state.lock();
        let stored = state
            .volume_mut(&usage.volume_name)
            .ok_or_else(|| CatalogError::VolumeNotFound(usage.volume_name.clone()))?;
        stored.apply_usage(usage);
        Ok(stored.clone())
    }

    fn create_job_media(&self, record: &JobMediaRecord) -> Result<u64, CatalogError> {
        let mut state = self.state.lock();
        state.next_job_media_id += 1;
        let mut stored = record.clone();
        stored.job_media_id = state.next_job_media_id;
        state.job_media.push(stored);
        Ok(state.next_job_media_id)
    }

    fn job_media_for_job(&self, job_id: u32) -> Result<Vec<JobMediaRecord>, CatalogError> {
        Ok(self
            .state
            .lock()
            .job_media
            .iter()
            .filter(|entry| entry.job_id == job_id)
            .cloned()
            .collect())
    }

    fn begin_transaction(&self, job_id: u32) -> Result<(), CatalogError> {
        self.state.lock().pending_files.entry(job_id).or_default();
        Ok(())
    }

    fn commit_transaction(&self, job_id: u32) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        let pending = state
            .pending_files
            .remove(&job_id)
            .ok_or(CatalogError::NoTransaction(job_id))?;
        debug!(
            "event=catalog_commit job_id={} files={}",
            job_id,
            pending.len()
        );
        state.files.extend(pending);
        Ok(())
    }

    fn create_file_attributes(&self, record: &FileAttributesRecord) -> Result<u64, CatalogError> {
        let mut state = self.state.lock();
        state.next_file_id += 1;
        let mut stored = record.clone();
        stored.file_id = state.next_file_id;
        match state.pending_files.get_mut(&record.job_id) {
            Some(pending) => pending.push(stored),
            None => state.files.push(stored),
        }
        Ok(state.next_file_id)
    }

    fn add_file_digest(&self, file_id: u64, digest: &str) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        let file = state
            .file_mut(file_id)
            .ok_or(CatalogError::FileNotFound(file_id))?;
        file.digest = Some(digest.to_string());
        Ok(())
    }
}
