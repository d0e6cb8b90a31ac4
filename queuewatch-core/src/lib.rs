//! Queuewatch core library: domain types, registry persistence, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and domain structs
//! - [`error`]: [`StoreError`]
//! - [`registry`]: load / save / in-memory collection ops

pub mod error;
pub mod registry;
pub mod types;

pub use error::StoreError;
pub use registry::Registry;
pub use types::{DifferenceRecord, MonitorConfig, MonitorId, SlugChange};
