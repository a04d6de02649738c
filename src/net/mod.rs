//! Blocking TCP transport between the storage side and the catalog daemon.

pub mod catalog;
pub mod frame;
pub mod server;

pub use catalog::{
    CatalogClient, CatalogClientError, CatalogServer, CatalogServerConfig, CatalogServerHandle,
};
pub use frame::{Frame, FrameError, MessageChannel, Signal, MAX_MESSAGE_LEN};
pub use server::{spawn_listener, ServerHandle};

use crate::protocol::ProtocolError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{context} did not stop within {waited_ms}ms")]
    ShutdownTimeout {
        context: &'static str,
        waited_ms: u128,
    },
    #[error("{context} thread panicked")]
    ThreadPanicked { context: &'static str },
}
