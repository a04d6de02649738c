//! Status transitions applied when a job reports volume usage.

use crate::catalog::{CatalogError, CatalogStore, PoolPolicy, VolumeRecord, VolumeStatus, VolumeUsage};
use crate::edit::{add_commas, format_duration};
use crate::job::JobContext;
use crate::messages::MessageSink;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetirementReason {
    CapacityReached,
    UsedOnce,
    MaxJobsReached,
    UseDurationExpired,
}

impl RetirementReason {
    pub fn status(self) -> VolumeStatus {
        match self {
            RetirementReason::CapacityReached => VolumeStatus::Full,
            RetirementReason::UsedOnce
            | RetirementReason::MaxJobsReached
            | RetirementReason::UseDurationExpired => VolumeStatus::Used,
        }
    }

    fn describe(self, usage: &VolumeUsage, pool: &PoolPolicy) -> String {
        let name = &usage.volume_name;
        match self {
            RetirementReason::CapacityReached => format!(
                "Max Volume bytes exceeded ({} of {} bytes). Marking Volume \"{name}\" as Full.",
                add_commas(usage.vol_bytes),
                add_commas(usage.vol_max_bytes)
            ),
            RetirementReason::UsedOnce => {
                format!("Volume used once. Marking Volume \"{name}\" as Used.")
            }
            RetirementReason::MaxJobsReached => format!(
                "Max Volume jobs exceeded ({}). Marking Volume \"{name}\" as Used.",
                pool.max_volume_jobs
            ),
            RetirementReason::UseDurationExpired => format!(
                "Max configured use duration exceeded ({}). Marking Volume \"{name}\" as Used.",
                format_duration(pool.volume_use_duration)
            ),
        }
    }
}

/// Decides whether reported usage retires the volume.
///
/// `stored_first_written` is only consulted for the use-duration check, after
/// every cheaper rule failed; returning `None` skips that check.
pub fn decide_retirement(
    usage: &VolumeUsage,
    pool: &PoolPolicy,
    now: u64,
    stored_first_written: impl FnOnce() -> Option<u64>,
) -> Option<RetirementReason> {
    if usage.vol_max_bytes > 0 && usage.vol_bytes >= usage.vol_max_bytes {
        return Some(RetirementReason::CapacityReached);
    }
    if pool.use_volume_once && usage.vol_bytes > 0 {
        return Some(RetirementReason::UsedOnce);
    }
    if pool.max_volume_jobs > 0 && usage.vol_jobs >= pool.max_volume_jobs {
        return Some(RetirementReason::MaxJobsReached);
    }
    if pool.volume_use_duration > 0 {
        if let Some(first_written) = stored_first_written() {
            if first_written > 0
                && now.saturating_sub(first_written) >= pool.volume_use_duration
            {
                return Some(RetirementReason::UseDurationExpired);
            }
        }
    }
    None
}

/// Applies retirement rules and persists volume usage.
pub struct VolumeRetirement<'a> {
    store: &'a dyn CatalogStore,
    messages: &'a dyn MessageSink,
}

impl<'a> VolumeRetirement<'a> {
    pub fn new(store: &'a dyn CatalogStore, messages: &'a dyn MessageSink) -> Self {
        Self { store, messages }
    }

    /// Persists `usage` for the job, first retiring the volume when the pool
    /// rules say so. Only writing jobs are subject to retirement.
    pub fn apply(
        &self,
        job: &JobContext,
        mut usage: VolumeUsage,
        now: u64,
    ) -> Result<VolumeRecord, CatalogError> {
        if job.kind.writes() {
            let reason = decide_retirement(&usage, &job.pool, now, || {
                self.stored_first_written(&job.job_name, &usage.volume_name)
            });
            if let Some(reason) = reason {
                self.messages
                    .info(&job.job_name, reason.describe(&usage, &job.pool));
                usage.status = reason.status();
            }
        }
        let stored = self.store.update_volume_usage(&usage)?;
        debug!(
            "event=volume_usage_recorded job={} volume={} status={} bytes={}",
            job.job_name, stored.volume_name, stored.status, stored.vol_bytes
        );
        Ok(stored)
    }

    fn stored_first_written(&self, job_name: &str, volume_name: &str) -> Option<u64> {
        match self.store.get_volume(volume_name) {
            Ok(Some(volume)) => Some(volume.first_written),
            Ok(None) => {
                self.messages.error(
                    job_name,
                    format!("Volume \"{volume_name}\" not found in catalog."),
                );
                None
            }
            Err(err) => {
                self.messages.error(
                    job_name,
                    format!("Catalog error fetching Volume \"{volume_name}\": {err}"),
                );
                None
            }
        }
    }
}
