//! Text protocol spoken between the storage daemon and the catalog.
//!
//! Requests are parsed once into a tagged [`InboundMessage`]; anything that
//! does not match a known shape is a [`ProtocolError`] the dispatcher answers
//! with an "invalid request" line while keeping the connection open.

pub mod attributes;
pub mod request;
pub mod response;

use crate::catalog::VolumeStatusError;
use thiserror::Error;

pub use attributes::{AttributeHeader, AttributeMessage, AttributePayload};
pub use request::{CatalogRequest, InboundMessage};
pub use response::{CatalogResponse, VolumeInfo};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message does not match any known request shape")]
    Unrecognized,
    #[error("missing field `{field}`")]
    MissingField { field: &'static str },
    #[error("field `{field}` is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("invalid value `{value}` for field `{field}`")]
    InvalidField { field: &'static str, value: String },
    #[error("unexpected trailing text `{0}`")]
    TrailingText(String),
    #[error(transparent)]
    InvalidStatus(#[from] VolumeStatusError),
    #[error("attribute message truncated: {context}")]
    TruncatedAttributes { context: &'static str },
    #[error("malformed record header `{0}`")]
    MalformedRecordHeader(String),
    #[error("unexpected response `{0}`")]
    UnexpectedResponse(String),
    #[error("malformed attribute message: {0}")]
    MalformedAttributes(#[source] Box<ProtocolError>),
}

impl ProtocolError {
    /// Attribute messages are unsolicited, so rejecting one sends nothing.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, ProtocolError::MalformedAttributes(_))
    }
}
