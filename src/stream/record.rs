use crate::protocol::ProtocolError;
use std::fmt;

/// Negative file indexes reserved for label records.
pub const PRE_LABEL: i32 = -1;
pub const VOL_LABEL: i32 = -2;
pub const EOM_LABEL: i32 = -3;
pub const SOS_LABEL: i32 = -4;
pub const EOS_LABEL: i32 = -5;

/// Stream identifiers the catalog cares about.
pub mod streams {
    pub const UNIX_ATTRIBUTES: i32 = 1;
    pub const FILE_DATA: i32 = 2;
    pub const MD5_DIGEST: i32 = 3;
    pub const WIN32_ATTRIBUTES: i32 = 11;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    PreLabel,
    VolumeLabel,
    EndOfMedia,
    StartOfSession,
    EndOfSession,
}

impl LabelKind {
    pub fn from_file_index(file_index: i32) -> Option<Self> {
        match file_index {
            PRE_LABEL => Some(LabelKind::PreLabel),
            VOL_LABEL => Some(LabelKind::VolumeLabel),
            EOM_LABEL => Some(LabelKind::EndOfMedia),
            SOS_LABEL => Some(LabelKind::StartOfSession),
            EOS_LABEL => Some(LabelKind::EndOfSession),
            _ => None,
        }
    }

    pub fn file_index(self) -> i32 {
        match self {
            LabelKind::PreLabel => PRE_LABEL,
            LabelKind::VolumeLabel => VOL_LABEL,
            LabelKind::EndOfMedia => EOM_LABEL,
            LabelKind::StartOfSession => SOS_LABEL,
            LabelKind::EndOfSession => EOS_LABEL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LabelKind::PreLabel => "PRE_LABEL",
            LabelKind::VolumeLabel => "VOL_LABEL",
            LabelKind::EndOfMedia => "EOM_LABEL",
            LabelKind::StartOfSession => "SOS_LABEL",
            LabelKind::EndOfSession => "EOS_LABEL",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record as read from a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceRecord {
    pub session_id: u32,
    pub session_time: u32,
    pub file_index: i32,
    pub stream: i32,
    pub data: Vec<u8>,
    /// Bytes of this record still to come from the next block.
    pub remainder: u32,
}

impl DeviceRecord {
    pub fn new(session_id: u32, session_time: u32, file_index: i32, stream: i32, data: Vec<u8>) -> Self {
        Self {
            session_id,
            session_time,
            file_index,
            stream,
            data,
            remainder: 0,
        }
    }

    /// A label record of `kind` carrying an encoded label payload.
    pub fn label(kind: LabelKind, session_id: u32, session_time: u32, data: Vec<u8>) -> Self {
        Self::new(session_id, session_time, kind.file_index(), 0, data)
    }

    pub fn is_complete(&self) -> bool {
        self.remainder == 0
    }

    pub fn label_kind(&self) -> Option<LabelKind> {
        LabelKind::from_file_index(self.file_index)
    }

    pub fn belongs_to(&self, session_id: u32, session_time: u32) -> bool {
        self.session_id == session_id && self.session_time == session_time
    }
}

const HEADER_KEYWORD: &str = "rechdr";

/// Text header sent ahead of each forwarded record payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub session_id: u32,
    pub session_time: u32,
    pub file_index: i32,
    pub stream: i32,
    pub data_len: u32,
}

impl RecordHeader {
    pub fn of(record: &DeviceRecord) -> Self {
        Self {
            session_id: record.session_id,
            session_time: record.session_time,
            file_index: record.file_index,
            stream: record.stream,
            data_len: record.data.len() as u32,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{HEADER_KEYWORD} {} {} {} {} {}",
            self.session_id, self.session_time, self.file_index, self.stream, self.data_len
        )
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let malformed = || ProtocolError::MalformedRecordHeader(line.to_string());
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some(HEADER_KEYWORD) {
            return Err(malformed());
        }
        let mut next = || tokens.next().ok_or_else(malformed);
        let header = Self {
            session_id: next()?.parse().map_err(|_| malformed())?,
            session_time: next()?.parse().map_err(|_| malformed())?,
            file_index: next()?.parse().map_err(|_| malformed())?,
            stream: next()?.parse().map_err(|_| malformed())?,
            data_len: next()?.parse().map_err(|_| malformed())?,
        };
        if tokens.next().is_some() {
            return Err(malformed());
        }
        Ok(header)
    }
}
