//! Payloads of volume and session label records.

use super::record::{DeviceRecord, LabelKind};
use std::io::{self, Read};
use thiserror::Error;

const VOLUME_MAGIC: &[u8; 4] = b"VSVL";
const SESSION_MAGIC: &[u8; 4] = b"VSSL";
pub const LABEL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("label payload truncated")]
    Truncated,
    #[error("label payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("label magic mismatch")]
    BadMagic,
    #[error("unsupported label version {0}")]
    UnsupportedVersion(u32),
    #[error("record is not a {expected} record")]
    WrongKind { expected: &'static str },
}

impl From<io::Error> for LabelError {
    fn from(_: io::Error) -> Self {
        LabelError::Truncated
    }
}

/// Identity written at the start of every volume.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VolumeHeader {
    pub volume_name: String,
    pub prev_volume_name: String,
    pub pool_name: String,
    pub media_type: String,
    pub label_time: u64,
}

impl VolumeHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(VOLUME_MAGIC);
        buf.extend_from_slice(&LABEL_VERSION.to_le_bytes());
        write_string(&mut buf, &self.volume_name);
        write_string(&mut buf, &self.prev_volume_name);
        write_string(&mut buf, &self.pool_name);
        write_string(&mut buf, &self.media_type);
        buf.extend_from_slice(&self.label_time.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LabelError> {
        let mut reader = bytes;
        read_preamble(&mut reader, VOLUME_MAGIC)?;
        Ok(Self {
            volume_name: read_string(&mut reader)?,
            prev_volume_name: read_string(&mut reader)?,
            pool_name: read_string(&mut reader)?,
            media_type: read_string(&mut reader)?,
            label_time: read_u64(&mut reader)?,
        })
    }

    pub fn from_record(record: &DeviceRecord) -> Result<Self, LabelError> {
        match record.label_kind() {
            Some(LabelKind::VolumeLabel | LabelKind::PreLabel) => Self::decode(&record.data),
            _ => Err(LabelError::WrongKind {
                expected: "volume label",
            }),
        }
    }

    pub fn to_record(&self) -> DeviceRecord {
        DeviceRecord::label(LabelKind::VolumeLabel, 0, 0, self.encode())
    }
}

/// Start or end marker of one job session on a volume.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionLabel {
    pub job_id: u32,
    pub job_name: String,
    pub client_name: String,
    pub pool_name: String,
    pub write_time: u64,
}

impl SessionLabel {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(SESSION_MAGIC);
        buf.extend_from_slice(&LABEL_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.job_id.to_le_bytes());
        write_string(&mut buf, &self.job_name);
        write_string(&mut buf, &self.client_name);
        write_string(&mut buf, &self.pool_name);
        buf.extend_from_slice(&self.write_time.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LabelError> {
        let mut reader = bytes;
        read_preamble(&mut reader, SESSION_MAGIC)?;
        Ok(Self {
            job_id: read_u32(&mut reader)?,
            job_name: read_string(&mut reader)?,
            client_name: read_string(&mut reader)?,
            pool_name: read_string(&mut reader)?,
            write_time: read_u64(&mut reader)?,
        })
    }

    pub fn from_record(record: &DeviceRecord) -> Result<Self, LabelError> {
        match record.label_kind() {
            Some(LabelKind::StartOfSession | LabelKind::EndOfSession) => {
                Self::decode(&record.data)
            }
            _ => Err(LabelError::WrongKind {
                expected: "session label",
            }),
        }
    }

    pub fn to_record(&self, kind: LabelKind, session_id: u32, session_time: u32) -> DeviceRecord {
        DeviceRecord::label(kind, session_id, session_time, self.encode())
    }
}

fn read_preamble(reader: &mut &[u8], magic: &[u8; 4]) -> Result<(), LabelError> {
    let mut found = [0u8; 4];
    reader.read_exact(&mut found)?;
    if &found != magic {
        return Err(LabelError::BadMagic);
    }
    let version = read_u32(reader)?;
    if version != LABEL_VERSION {
        return Err(LabelError::UnsupportedVersion(version));
    }
    Ok(())
}

fn write_string(writer: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    writer.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    writer.extend_from_slice(bytes);
}

fn read_string(reader: &mut &[u8]) -> Result<String, LabelError> {
    let len = read_u32(reader)? as usize;
    if reader.len() < len {
        return Err(LabelError::Truncated);
    }
    let (head, tail) = reader.split_at(len);
    *reader = tail;
    let value = std::str::from_utf8(head).map_err(|_| LabelError::InvalidUtf8)?;
    Ok(value.to_string())
}

fn read_u32(reader: &mut &[u8]) -> Result<u32, LabelError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(reader: &mut &[u8]) -> Result<u64, LabelError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}
