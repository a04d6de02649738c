//! Storage-side session streaming: device records, labels, restore
//! selection and the engine that forwards one session to a consumer.

pub mod bsr;
pub mod device;
pub mod engine;
pub mod label;
pub mod reader;
pub mod record;

pub use bsr::{BootstrapSelector, RestoreSelector};
pub use device::{Device, DeviceActivity, DeviceError, DeviceLease, MediumItem, MemoryDevice};
pub use engine::{
    CapturedStream, ReadError, ReadJob, ReadSummary, RecordSink, RecordStreamer, StreamState,
    VolumeLookup, VolumeLookupError, DATA_ACK,
};
pub use label::{LabelError, SessionLabel, VolumeHeader};
pub use reader::{FrameSource, RecordStreamReader, StreamDecodeError, StreamFrame};
pub use record::{DeviceRecord, LabelKind, RecordHeader};
