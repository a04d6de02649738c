use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Volume (media) status as stored in the catalog and carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VolumeStatus {
    #[default]
    Append,
    Full,
    Used,
    Recycle,
    Purged,
    Error,
    Disabled,
    Archive,
    #[serde(rename = "Read-Only")]
    ReadOnly,
    Cleaning,
}

impl VolumeStatus {
    /// Widest status accepted in a protocol field.
    pub const MAX_WIRE_LEN: usize = 10;

    const ALL: [VolumeStatus; 10] = [
        VolumeStatus::Append,
        VolumeStatus::Full,
        VolumeStatus::Used,
        VolumeStatus::Recycle,
        VolumeStatus::Purged,
        VolumeStatus::Error,
        VolumeStatus::Disabled,
        VolumeStatus::Archive,
        VolumeStatus::ReadOnly,
        VolumeStatus::Cleaning,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VolumeStatus::Append => "Append",
            VolumeStatus::Full => "Full",
            VolumeStatus::Used => "Used",
            VolumeStatus::Recycle => "Recycle",
            VolumeStatus::Purged => "Purged",
            VolumeStatus::Error => "Error",
            VolumeStatus::Disabled => "Disabled",
            VolumeStatus::Archive => "Archive",
            VolumeStatus::ReadOnly => "Read-Only",
            VolumeStatus::Cleaning => "Cleaning",
        }
    }

    /// Only these two states may receive new appends.
    pub fn accepts_appends(self) -> bool {
        matches!(self, VolumeStatus::Append | VolumeStatus::Recycle)
    }
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VolumeStatusError {
    #[error("volume status `{0}` exceeds {max} characters", max = VolumeStatus::MAX_WIRE_LEN)]
    TooLong(String),
    #[error("unknown volume status `{0}`")]
    Unknown(String),
}

impl FromStr for VolumeStatus {
    type Err = VolumeStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() > Self::MAX_WIRE_LEN {
            return Err(VolumeStatusError::TooLong(value.to_string()));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| VolumeStatusError::Unknown(value.to_string()))
    }
}

/// One row of the volume table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub media_id: u32,
    pub volume_name: String,
    pub pool_id: u32,
    pub media_type: String,
    pub status: VolumeStatus,
    pub vol_jobs: u32,
    pub vol_files: u32,
    pub vol_blocks: u32,
    pub vol_bytes: u64,
    pub vol_mounts: u32,
    pub vol_errors: u32,
    pub vol_writes: u32,
    pub vol_max_bytes: u64,
    pub vol_capacity_bytes: u64,
    /// Unix seconds, 0 when nothing was written yet.
    pub first_written: u64,
    pub last_written: u64,
    pub slot: i32,
    pub relabel: bool,
}

impl VolumeRecord {
    pub fn new(
        volume_name: impl Into<String>,
        pool_id: u32,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            volume_name: volume_name.into(),
            pool_id,
            media_type: media_type.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: VolumeStatus) -> Self {
        self.status = status;
        self
    }

    /// Applies the counters reported by a usage update.
    pub fn apply_usage(&mut self, update: &VolumeUsage) {
        self.vol_jobs = update.vol_jobs;
        self.vol_files = update.vol_files;
        self.vol_blocks = update.vol_blocks;
        self.vol_bytes = update.vol_bytes;
        self.vol_mounts = update.vol_mounts;
        self.vol_errors = update.vol_errors;
        self.vol_writes = update.vol_writes;
        self.vol_max_bytes = update.vol_max_bytes;
        self.last_written = update.end_time;
        self.status = update.status;
        self.slot = update.slot;
        self.relabel = update.relabel;
        if self.first_written == 0 && update.vol_bytes > 0 {
            self.first_written = update.end_time;
        }
    }

    /// Returns the volume to the freshly labeled state keeping its identity.
    pub fn reset_for_recycle(&mut self) {
        self.status = VolumeStatus::Recycle;
        self.vol_jobs = 0;
        self.vol_files = 0;
        self.vol_blocks = 0;
        self.vol_bytes = 0;
        self.vol_errors = 0;
        self.vol_writes = 0;
        self.first_written = 0;
        self.last_written = 0;
    }
}

/// Usage counters reported by the storage daemon at the end of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VolumeUsage {
    pub volume_name: String,
    pub vol_jobs: u32,
    pub vol_files: u32,
    pub vol_blocks: u32,
    pub vol_bytes: u64,
    pub vol_mounts: u32,
    pub vol_errors: u32,
    pub vol_writes: u32,
    pub vol_max_bytes: u64,
    pub end_time: u64,
    pub status: VolumeStatus,
    pub slot: i32,
    pub relabel: bool,
}

/// Position index entry: a range of a job's records on one volume.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobMediaRecord {
    pub job_media_id: u64,
    pub job_id: u32,
    pub media_id: u32,
    pub first_index: u32,
    pub last_index: u32,
    pub start_file: u32,
    pub end_file: u32,
    pub start_block: u32,
    pub end_block: u32,
}

/// The span fields of a `CreateJobMedia` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobMediaSpan {
    pub first_index: u32,
    pub last_index: u32,
    pub start_file: u32,
    pub end_file: u32,
    pub start_block: u32,
    pub end_block: u32,
}

impl JobMediaSpan {
    pub fn into_record(self, job_id: u32, media_id: u32) -> JobMediaRecord {
        JobMediaRecord {
            job_media_id: 0,
            job_id,
            media_id,
            first_index: self.first_index,
            last_index: self.last_index,
            start_file: self.start_file,
            end_file: self.end_file,
            start_block: self.start_block,
            end_block: self.end_block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileAttributesRecord {
    pub file_id: u64,
    pub job_id: u32,
    pub file_index: i32,
    pub stream: i32,
    pub fname: String,
    pub attributes: String,
    pub digest: Option<String>,
}

/// Retention and usage rules shared by every volume of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPolicy {
    pub pool_id: u32,
    pub name: String,
    pub use_volume_once: bool,
    pub max_volume_jobs: u32,
    /// Seconds; 0 disables the check.
    pub volume_use_duration: u64,
    pub accept_any_volume: bool,
    pub catalog_files: bool,
    /// Prefix for automatically created volumes; `None` disables creation.
    pub label_format: Option<String>,
    /// 0 means unlimited.
    pub max_volumes: u32,
    pub max_volume_bytes: u64,
    pub volume_retention: u64,
    pub recycle: bool,
}

impl PoolPolicy {
    pub fn new(pool_id: u32, name: impl Into<String>) -> Self {
        Self {
            pool_id,
            name: name.into(),
            use_volume_once: false,
            max_volume_jobs: 0,
            volume_use_duration: 0,
            accept_any_volume: true,
            catalog_files: true,
            label_format: None,
            max_volumes: 0,
            max_volume_bytes: 0,
            volume_retention: 60 * 60 * 24 * 365,
            recycle: true,
        }
    }
}
