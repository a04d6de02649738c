//! Volume selection for appending jobs and volume lookup by name.

use crate::catalog::{CatalogError, CatalogStore, VolumeQuery, VolumeRecord, VolumeStatus};
use crate::edit::validate_name;
use crate::job::JobContext;
use crate::messages::MessageSink;
use log::{debug, info, warn};
use std::fmt;

/// Hard ceiling on expire-and-retry rounds of one selection.
pub const MAX_SELECTION_ATTEMPTS: u32 = 200;

/// Upper bound on probing names when an auto-created label is taken.
const MAX_LABEL_PROBES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMediaReason {
    /// Every fallback came up empty.
    Exhausted,
    /// Candidates kept expiring until the attempt ceiling.
    RetryCeiling,
    /// An expired candidate could not be marked `Used`.
    MarkUsedFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Selected(VolumeRecord),
    NoMedia(NoMediaReason),
}

/// Why a named volume cannot be written by the asking job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    WrongPool { pool_id: u32 },
    Status(VolumeStatus),
    WrongMediaType(String),
    /// The pool only takes volumes offered by selection.
    NotOffered,
    InUse,
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligible::WrongPool { pool_id } => write!(f, "volume belongs to pool {pool_id}"),
            Ineligible::Status(status) => write!(f, "volume status is {status}"),
            Ineligible::WrongMediaType(media_type) => {
                write!(f, "volume media type is {media_type}")
            }
            Ineligible::NotOffered => f.write_str("pool does not accept unrequested volumes"),
            Ineligible::InUse => f.write_str("volume is in use by another job"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeEligibility {
    Eligible(VolumeRecord),
    NotFound,
    NotAppropriate(Ineligible),
}

/// Picks and validates volumes against the catalog on behalf of jobs.
pub struct VolumeSelector<'a> {
    store: &'a dyn CatalogStore,
    messages: &'a dyn MessageSink,
}

impl<'a> VolumeSelector<'a> {
    pub fn new(store: &'a dyn CatalogStore, messages: &'a dyn MessageSink) -> Self {
        Self { store, messages }
    }

    /// Selects the volume the job should append to next.
    ///
    /// Candidates whose use duration has lapsed are marked `Used` and the
    /// search repeats, at most [`MAX_SELECTION_ATTEMPTS`] times. On success
    /// the job's current volume is updated and the volume stays claimed for
    /// the job until its claims are released.
    pub fn select_for_append(
        &self,
        job: &mut JobContext,
        index: u32,
        now: u64,
    ) -> Result<Selection, CatalogError> {
        let query = VolumeQuery {
            job_id: job.job_id,
            pool_id: job.pool_id(),
            media_type: job.media_type.clone(),
            index,
        };
        for attempt in 1..=MAX_SELECTION_ATTEMPTS {
            let Some(mut volume) = self.find_candidate(job, &query, now)? else {
                debug!(
                    "event=volume_select_empty job={} pool={} attempt={}",
                    job.job_name, job.pool.name, attempt
                );
                return Ok(Selection::NoMedia(NoMediaReason::Exhausted));
            };
            if !self.use_duration_expired(job, &volume, now) {
                job.assign_volume(volume.media_id, &volume.volume_name);
                info!(
                    "event=volume_selected job={} volume={} media_id={} attempt={}",
                    job.job_name, volume.volume_name, volume.media_id, attempt
                );
                return Ok(Selection::Selected(volume));
            }
            self.messages.info(
                &job.job_name,
                format!(
                    "Max configured use duration exceeded. Marking Volume \"{}\" as Used.",
                    volume.volume_name
                ),
            );
            volume.status = VolumeStatus::Used;
            if let Err(err) = self.store.update_volume(&volume) {
                self.messages.error(
                    &job.job_name,
                    format!(
                        "Catalog error marking Volume \"{}\" as Used: {err}",
                        volume.volume_name
                    ),
                );
                return Ok(Selection::NoMedia(NoMediaReason::MarkUsedFailed));
            }
        }
        self.messages.error(
            &job.job_name,
            format!(
                "We seem to be looping trying to find the next volume. \
                 I give up after {MAX_SELECTION_ATTEMPTS} attempts."
            ),
        );
        Ok(Selection::NoMedia(NoMediaReason::RetryCeiling))
    }

    fn find_candidate(
        &self,
        job: &JobContext,
        query: &VolumeQuery,
        now: u64,
    ) -> Result<Option<VolumeRecord>, CatalogError> {
        if let Some(volume) = self.store.find_next_volume(query)? {
            return Ok(Some(volume));
        }
        if job.pool.recycle {
            if let Some(volume) = self.store.find_recycled_volume(query)? {
                debug!("event=volume_select_recycled volume={}", volume.volume_name);
                return Ok(Some(volume));
            }
        }
        let pruned = self.store.prune_volumes(&job.pool, now)?;
        debug!("event=volume_select_pruned pool={} pruned={pruned}", job.pool.name);
        // Volumes purged by earlier requests are recyclable too.
        if job.pool.recycle {
            if let Some(volume) = self.store.recycle_volume(query)? {
                self.messages.info(
                    &job.job_name,
                    format!("Recycled volume \"{}\"", volume.volume_name),
                );
                return Ok(Some(volume));
            }
        }
        self.create_volume(job)
    }

    /// Labels a fresh volume when the pool allows automatic creation.
    fn create_volume(&self, job: &JobContext) -> Result<Option<VolumeRecord>, CatalogError> {
        let Some(prefix) = job.pool.label_format.as_deref() else {
            return Ok(None);
        };
        let count = self.store.count_pool_volumes(job.pool_id())?;
        if job.pool.max_volumes > 0 && count >= job.pool.max_volumes {
            warn!(
                "event=volume_create_refused pool={} count={} max={}",
                job.pool.name, count, job.pool.max_volumes
            );
            return Ok(None);
        }
        for sequence in (count + 1)..=(count + MAX_LABEL_PROBES) {
            let name = format!("{prefix}{sequence:04}");
            if let Err(err) = validate_name(&name) {
                self.messages.error(
                    &job.job_name,
                    format!("Illegal volume name \"{name}\" from label format: {err}"),
                );
                return Ok(None);
            }
            if self.store.get_volume(&name)?.is_some() {
                continue;
            }
            let mut record = VolumeRecord::new(&name, job.pool_id(), &job.media_type);
            record.vol_max_bytes = job.pool.max_volume_bytes;
            let created = match self.store.create_volume(job.job_id, record) {
                Ok(created) => created,
                Err(CatalogError::DuplicateVolume(_)) => continue,
                Err(err) => return Err(err),
            };
            self.messages.info(
                &job.job_name,
                format!("Created new Volume \"{}\" in catalog.", created.volume_name),
            );
            return Ok(Some(created));
        }
        Ok(None)
    }

    fn use_duration_expired(&self, job: &JobContext, volume: &VolumeRecord, now: u64) -> bool {
        let duration = job.pool.volume_use_duration;
        duration > 0
            && volume.status != VolumeStatus::Recycle
            && volume.first_written > 0
            && now.saturating_sub(volume.first_written) >= duration
    }

    /// Looks up a named volume and makes it the job's current volume. With
    /// `for_write` the volume must also suit the job for appending, and is
    /// claimed for it when it does.
    pub fn lookup_volume(
        &self,
        job: &mut JobContext,
        volume_name: &str,
        for_write: bool,
    ) -> Result<VolumeEligibility, CatalogError> {
        let Some(volume) = self.store.get_volume(volume_name)? else {
            debug!(
                "event=volume_lookup_missing job={} volume={}",
                job.job_name, volume_name
            );
            return Ok(VolumeEligibility::NotFound);
        };
        job.assign_volume(volume.media_id, &volume.volume_name);
        if for_write {
            if let Some(reason) = self.write_ineligibility(job, &volume)? {
                info!(
                    "event=volume_not_appropriate job={} volume={} reason=\"{}\"",
                    job.job_name, volume_name, reason
                );
                return Ok(VolumeEligibility::NotAppropriate(reason));
            }
        }
        Ok(VolumeEligibility::Eligible(volume))
    }

    fn write_ineligibility(
        &self,
        job: &JobContext,
        volume: &VolumeRecord,
    ) -> Result<Option<Ineligible>, CatalogError> {
        if volume.pool_id != job.pool_id() {
            return Ok(Some(Ineligible::WrongPool {
                pool_id: volume.pool_id,
            }));
        }
        if !volume.status.accepts_appends() {
            return Ok(Some(Ineligible::Status(volume.status)));
        }
        if volume.media_type != job.media_type {
            return Ok(Some(Ineligible::WrongMediaType(volume.media_type.clone())));
        }
        if !job.pool.accept_any_volume {
            return Ok(Some(Ineligible::NotOffered));
        }
        if !self.store.claim_volume(job.job_id, volume.media_id)? {
            return Ok(Some(Ineligible::InUse));
        }
        Ok(None)
    }
}
