//! Volume catalog boundary: record types, the store trait and the in-memory
//! reference store.

pub mod memory;
pub mod store;
pub mod types;

pub use memory::MemoryCatalog;
pub use store::{CatalogError, CatalogStore, VolumeQuery};
pub use types::{
    FileAttributesRecord, JobMediaRecord, JobMediaSpan, PoolPolicy, VolumeRecord, VolumeStatus,
    VolumeStatusError, VolumeUsage,
};
