//! Error types for queuewatch-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::MonitorId;

/// All errors that can arise from registry operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (write/save path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error on load: includes the file path for context.
    #[error("failed to parse registry at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.queuewatch/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No registry entry exists for the given id.
    #[error("monitor not found: {0}")]
    MonitorNotFound(MonitorId),
}
