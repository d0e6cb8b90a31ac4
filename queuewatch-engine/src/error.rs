//! Error surface for poll cycles and engine timer management.
//!
//! Every variant is monitor-scoped and non-fatal: cycle errors are caught at
//! the tick boundary, surfaced through the notification sink, and never tear
//! down the recurring timer or the process.

use queuewatch_core::{MonitorId, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    /// Monitor has no endpoint URL configured; polling refuses the cycle.
    #[error("monitor '{monitor}' has no endpoint URL configured")]
    MissingUrl { monitor: String },

    /// Endpoint answered with a non-2xx status.
    #[error("endpoint returned HTTP {status}")]
    Http { status: u16 },

    /// Body was neither valid JSON nor a recognized settings literal.
    #[error("unsupported response format: body is neither JSON nor a queueFair settings literal")]
    UnsupportedFormat,

    /// Extraction matched nothing (filter missed, or body had no records).
    #[error("no data found in response")]
    NoData,

    /// No registry entry exists for the monitor.
    #[error("unknown monitor: {0}")]
    UnknownMonitor(MonitorId),

    /// Registry load/save failure while applying a cycle result.
    #[error("registry error: {0}")]
    Store(#[from] StoreError),

    /// Transport-level failure (connect, timeout, body read) or client build.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}
