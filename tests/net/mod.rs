#[path = "../support/catalog.rs"]
pub mod catalog_support;
#[path = "../support/net.rs"]
pub mod net_support;
#[path = "../support/stream.rs"]
pub mod stream_support;

mod catalog_session_it;
