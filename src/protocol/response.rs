use super::request::Fields;
use super::ProtocolError;
use crate::catalog::{VolumeRecord, VolumeStatus};
use crate::edit::{escape_spaces, unescape_spaces};
use std::str::FromStr;

const OK_VOLUME_PREFIX: &str = "1000 OK VolName=";
const OK_UPDATE: &str = "1000 OK UpdateMedia";
const NO_MEDIA: &str = "1999 No Media";
const VOLUME_NOT_FOUND: &str = "1999 Volume Not Found.";
const VOLUME_NOT_APPROPRIATE: &str = "1998 Volume not appropriate.";
const UPDATE_MEDIA_ERROR: &str = "1992 Update Media error";
const JOB_MEDIA_ERROR: &str = "1991 Update JobMedia error";
const INVALID_PREFIX: &str = "1990 Invalid Catalog Request: ";

/// Statistics snapshot returned for a selected or looked-up volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume_name: String,
    pub vol_jobs: u32,
    pub vol_files: u32,
    pub vol_blocks: u32,
    pub vol_bytes: u64,
    pub vol_mounts: u32,
    pub vol_errors: u32,
    pub vol_writes: u32,
    pub vol_max_bytes: u64,
    pub vol_capacity_bytes: u64,
    pub status: VolumeStatus,
    pub slot: i32,
}

impl From<&VolumeRecord> for VolumeInfo {
    fn from(record: &VolumeRecord) -> Self {
        Self {
            volume_name: record.volume_name.clone(),
            vol_jobs: record.vol_jobs,
            vol_files: record.vol_files,
            vol_blocks: record.vol_blocks,
            vol_bytes: record.vol_bytes,
            vol_mounts: record.vol_mounts,
            vol_errors: record.vol_errors,
            vol_writes: record.vol_writes,
            vol_max_bytes: record.vol_max_bytes,
            vol_capacity_bytes: record.vol_capacity_bytes,
            status: record.status,
            slot: record.slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogResponse {
    Volume(VolumeInfo),
    Updated,
    NoMedia,
    VolumeNotFound,
    VolumeNotAppropriate,
    UpdateMediaError,
    JobMediaError,
    /// Echoes the offending request text.
    Invalid(String),
}

impl CatalogResponse {
    pub fn invalid(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        CatalogResponse::Invalid(text.trim_end_matches(['\n', '\r']).to_string())
    }

    pub fn code(&self) -> u32 {
        match self {
            CatalogResponse::Volume(_) | CatalogResponse::Updated => 1000,
            CatalogResponse::NoMedia | CatalogResponse::VolumeNotFound => 1999,
            CatalogResponse::VolumeNotAppropriate => 1998,
            CatalogResponse::UpdateMediaError => 1992,
            CatalogResponse::JobMediaError => 1991,
            CatalogResponse::Invalid(_) => 1990,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code() == 1000
    }

    /// Renders the response line, newline included.
    pub fn render(&self) -> String {
        match self {
            CatalogResponse::Volume(info) => format!(
                "{OK_VOLUME_PREFIX}{} VolJobs={} VolFiles={} VolBlocks={} VolBytes={} \
                 VolMounts={} VolErrors={} VolWrites={} VolMaxBytes={} VolCapacityBytes={} \
                 VolStatus={} Slot={}\n",
                escape_spaces(&info.volume_name),
                info.vol_jobs,
                info.vol_files,
                info.vol_blocks,
                info.vol_bytes,
                info.vol_mounts,
                info.vol_errors,
                info.vol_writes,
                info.vol_max_bytes,
                info.vol_capacity_bytes,
                info.status,
                info.slot
            ),
            CatalogResponse::Updated => format!("{OK_UPDATE}\n"),
            CatalogResponse::NoMedia => format!("{NO_MEDIA}\n"),
            CatalogResponse::VolumeNotFound => format!("{VOLUME_NOT_FOUND}\n"),
            CatalogResponse::VolumeNotAppropriate => format!("{VOLUME_NOT_APPROPRIATE}\n"),
            CatalogResponse::UpdateMediaError => format!("{UPDATE_MEDIA_ERROR}\n"),
            CatalogResponse::JobMediaError => format!("{JOB_MEDIA_ERROR}\n"),
            CatalogResponse::Invalid(text) => format!("{INVALID_PREFIX}{text}\n"),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\n', '\r']);
        if let Some(text) = line.strip_prefix(INVALID_PREFIX) {
            return Ok(CatalogResponse::Invalid(text.to_string()));
        }
        if line.starts_with(OK_VOLUME_PREFIX) {
            return parse_volume_info(line).map(CatalogResponse::Volume);
        }
        match line {
            OK_UPDATE => Ok(CatalogResponse::Updated),
            NO_MEDIA => Ok(CatalogResponse::NoMedia),
            VOLUME_NOT_FOUND => Ok(CatalogResponse::VolumeNotFound),
            VOLUME_NOT_APPROPRIATE => Ok(CatalogResponse::VolumeNotAppropriate),
            UPDATE_MEDIA_ERROR => Ok(CatalogResponse::UpdateMediaError),
            JOB_MEDIA_ERROR => Ok(CatalogResponse::JobMediaError),
            other => Err(ProtocolError::UnexpectedResponse(other.to_string())),
        }
    }
}

fn parse_volume_info(line: &str) -> Result<VolumeInfo, ProtocolError> {
    let mut fields = Fields::new(line);
    fields.keyword("1000")?;
    fields.keyword("OK")?;
    let info = VolumeInfo {
        volume_name: unescape_spaces(&fields.name("VolName")?),
        vol_jobs: fields.number("VolJobs")?,
        vol_files: fields.number("VolFiles")?,
        vol_blocks: fields.number("VolBlocks")?,
        vol_bytes: fields.number("VolBytes")?,
        vol_mounts: fields.number("VolMounts")?,
        vol_errors: fields.number("VolErrors")?,
        vol_writes: fields.number("VolWrites")?,
        vol_max_bytes: fields.number("VolMaxBytes")?,
        vol_capacity_bytes: fields.number("VolCapacityBytes")?,
        status: VolumeStatus::from_str(fields.value("VolStatus")?)?,
        slot: fields.number("Slot")?,
    };
    fields.finish()?;
    Ok(info)
}
