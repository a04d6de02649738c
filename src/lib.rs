//! Volume life-cycle control and session record streaming for networked
//! backup daemons.
//!
//! The catalog side answers storage daemon requests for appendable volumes,
//! volume facts and usage updates; the storage side streams one session's
//! records off one or more volumes to a consumer.

pub mod catalog;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod edit;
pub mod job;
pub mod messages;
#[cfg(feature = "net")]
pub mod net;
pub mod protocol;
pub mod retirement;
pub mod selection;
pub mod stream;
pub mod util;

pub use catalog::{
    CatalogError, CatalogStore, JobMediaRecord, JobMediaSpan, MemoryCatalog, PoolPolicy,
    VolumeQuery, VolumeRecord, VolumeStatus, VolumeUsage,
};
pub use config::{load_config, ConfigError, DaemonConfig};
pub use daemon::{Daemon, DaemonContext};
pub use dispatcher::CatalogDispatcher;
pub use job::{CancelToken, JobContext, JobKind, JobRegistry, SharedJob};
pub use messages::{LogSink, MemorySink, MessageSink, MessageType};
#[cfg(feature = "net")]
pub use net::{CatalogClient, CatalogClientError, CatalogServer, CatalogServerConfig, NetError};
pub use protocol::{
    AttributeHeader, AttributeMessage, AttributePayload, CatalogRequest, CatalogResponse,
    InboundMessage, ProtocolError, VolumeInfo,
};
pub use retirement::{decide_retirement, RetirementReason, VolumeRetirement};
pub use selection::{
    Ineligible, NoMediaReason, Selection, VolumeEligibility, VolumeSelector,
    MAX_SELECTION_ATTEMPTS,
};
pub use stream::{
    BootstrapSelector, Device, DeviceError, DeviceLease, MemoryDevice, ReadError, ReadJob,
    ReadSummary, RecordSink, RecordStreamReader, RecordStreamer, RestoreSelector,
};
pub use util::{unix_now, RetryPolicy, VolstreamError};
