//! Daemon runtime: poll engine lifecycle + Unix socket control server.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_reload, request_start_monitor, request_status, request_stop, request_stop_monitor,
    send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
