//! Binary `UpdCat` messages carrying file attributes and digests.

use super::request::UPDATE_KEYWORD;
use super::ProtocolError;
use crate::stream::record::streams;

const ATTRIBUTES_KEYWORD: &str = "FileAttributes";
const HEADER_LEN: usize = 20;
pub const DIGEST_LEN: usize = 16;

/// Record identity preceding the attribute body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeHeader {
    pub session_id: u32,
    pub session_time: u32,
    pub file_index: i32,
    pub stream: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributePayload {
    /// UNIX or WIN32 attribute stream.
    Attributes {
        file_type: i32,
        fname: String,
        attributes: String,
    },
    /// Raw MD5 digest of the previously sent file.
    Digest([u8; DIGEST_LEN]),
    /// Streams the catalog does not record.
    Other(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMessage {
    pub job: String,
    pub header: AttributeHeader,
    pub payload: AttributePayload,
}

impl AttributeMessage {
    pub fn encode(&self) -> Vec<u8> {
        let body = match &self.payload {
            AttributePayload::Attributes {
                file_type,
                fname,
                attributes,
            } => format!(
                "{} {} {}\0{}\0",
                self.header.file_index, file_type, fname, attributes
            )
            .into_bytes(),
            AttributePayload::Digest(digest) => digest.to_vec(),
            AttributePayload::Other(raw) => raw.clone(),
        };
        let prefix = format!("{UPDATE_KEYWORD} Job={} {ATTRIBUTES_KEYWORD} ", self.job);
        let mut out = Vec::with_capacity(prefix.len() + HEADER_LEN + body.len());
        out.extend_from_slice(prefix.as_bytes());
        out.extend_from_slice(&self.header.session_id.to_be_bytes());
        out.extend_from_slice(&self.header.session_time.to_be_bytes());
        out.extend_from_slice(&self.header.file_index.to_be_bytes());
        out.extend_from_slice(&self.header.stream.to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (keyword, rest) = split_token(bytes)?;
        if keyword != UPDATE_KEYWORD.as_bytes() {
            return Err(ProtocolError::Unrecognized);
        }
        let (job_token, rest) = split_token(rest)?;
        let job = std::str::from_utf8(job_token)
            .ok()
            .and_then(|token| token.strip_prefix("Job="))
            .ok_or(ProtocolError::MissingField { field: "Job" })?;
        if job.len() >= crate::edit::MAX_NAME_LENGTH {
            return Err(ProtocolError::FieldTooLong {
                field: "Job",
                len: job.len(),
                max: crate::edit::MAX_NAME_LENGTH - 1,
            });
        }
        let (kind, rest) = split_token(rest)?;
        if kind != ATTRIBUTES_KEYWORD.as_bytes() {
            return Err(ProtocolError::Unrecognized);
        }
        if rest.len() < HEADER_LEN {
            return Err(ProtocolError::TruncatedAttributes { context: "header" });
        }
        let (raw_header, rest) = rest.split_at(HEADER_LEN);
        let header = AttributeHeader {
            session_id: be_u32(&raw_header[0..4]),
            session_time: be_u32(&raw_header[4..8]),
            file_index: be_u32(&raw_header[8..12]) as i32,
            stream: be_u32(&raw_header[12..16]) as i32,
        };
        let data_len = be_u32(&raw_header[16..20]) as usize;
        let body = rest
            .get(..data_len)
            .ok_or(ProtocolError::TruncatedAttributes { context: "body" })?;
        let payload = match header.stream {
            streams::UNIX_ATTRIBUTES | streams::WIN32_ATTRIBUTES => parse_attributes(body)?,
            streams::MD5_DIGEST => {
                let digest = body
                    .get(..DIGEST_LEN)
                    .and_then(|raw| <[u8; DIGEST_LEN]>::try_from(raw).ok())
                    .ok_or(ProtocolError::TruncatedAttributes { context: "digest" })?;
                AttributePayload::Digest(digest)
            }
            _ => AttributePayload::Other(body.to_vec()),
        };
        Ok(Self {
            job: job.to_string(),
            header,
            payload,
        })
    }
}

fn be_u32(raw: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(raw);
    u32::from_be_bytes(buf)
}

/// Splits off the bytes before the next single space.
fn split_token(bytes: &[u8]) -> Result<(&[u8], &[u8]), ProtocolError> {
    let at = bytes
        .iter()
        .position(|byte| *byte == b' ')
        .ok_or(ProtocolError::Unrecognized)?;
    Ok((&bytes[..at], &bytes[at + 1..]))
}

fn parse_attributes(body: &[u8]) -> Result<AttributePayload, ProtocolError> {
    let (_file_index, rest) = split_token(body)?;
    let (file_type, rest) = split_token(rest)?;
    let file_type = std::str::from_utf8(file_type)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| ProtocolError::InvalidField {
            field: "FileType",
            value: String::from_utf8_lossy(file_type).into_owned(),
        })?;
    let mut parts = rest.splitn(3, |byte| *byte == 0);
    let fname = parts.next().unwrap_or_default();
    let attributes = parts
        .next()
        .ok_or(ProtocolError::TruncatedAttributes {
            context: "attributes",
        })?;
    Ok(AttributePayload::Attributes {
        file_type,
        fname: String::from_utf8_lossy(fname).into_owned(),
        attributes: String::from_utf8_lossy(attributes).into_owned(),
    })
}
