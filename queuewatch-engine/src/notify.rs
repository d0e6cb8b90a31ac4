//! Fire-and-forget notification sink.
//!
//! Cycle results and errors are surfaced per monitor; delivery is
//! best-effort with no acknowledgment.

use queuewatch_core::MonitorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A monitor-scoped, user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub monitor_id: MonitorId,
    pub monitor: String,
    pub severity: Severity,
    pub message: String,
}

impl Notification {
    pub fn info(id: &MonitorId, monitor: &str, message: impl Into<String>) -> Self {
        Self {
            monitor_id: id.clone(),
            monitor: monitor.to_owned(),
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn error(id: &MonitorId, monitor: &str, message: impl Into<String>) -> Self {
        Self {
            monitor_id: id.clone(),
            monitor: monitor.to_owned(),
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// Where notifications end up. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Default sink for the daemon: notifications become tracing events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: &Notification) {
        match notification.severity {
            Severity::Info => tracing::info!(
                monitor = %notification.monitor,
                monitor_id = %notification.monitor_id,
                "{}",
                notification.message,
            ),
            Severity::Error => tracing::warn!(
                monitor = %notification.monitor,
                monitor_id = %notification.monitor_id,
                "{}",
                notification.message,
            ),
        }
    }
}
