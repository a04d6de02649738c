#[path = "../support/catalog.rs"]
pub mod catalog_support;

mod daemon_it;
mod retirement_it;
mod selection_it;
