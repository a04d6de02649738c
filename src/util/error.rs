use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::edit::EditError;
use crate::protocol::ProtocolError;
use crate::stream::{DeviceError, ReadError};
use thiserror::Error;

#[cfg(feature = "net")]
use crate::net::NetError;

/// Crate-wide error aggregating every layer.
#[derive(Debug, Error)]
pub enum VolstreamError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[cfg(feature = "net")]
    #[error(transparent)]
    Network(#[from] NetError),
    #[error("{0}")]
    Other(String),
}
