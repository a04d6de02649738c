//! Miscellaneous shared helpers (config paths, retry policies, clocks).

pub mod config;
pub mod error;
pub mod retry;

pub use config::{config_base_dir, resolve_relative};
pub use error::VolstreamError;
pub use retry::{RetryHandle, RetryPolicy, RetryStrategy};

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the Unix epoch, 0 if the clock is before it.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
