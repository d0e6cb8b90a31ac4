//! Per-monitor timer lifecycle.
//!
//! The engine owns one timer task per running monitor, keyed by id. Starting
//! an already-running monitor is a no-op; any user-facing path that tears a
//! timer down also clears the monitor's `is_running` flag, keeping flag and
//! timer in lockstep. The exception is the shutdown drain (`stop_all`),
//! which leaves the durable flags in place so they record what to resume.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use queuewatch_core::{registry, MonitorId, Registry};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::cycle;
use crate::error::PollError;
use crate::notify::NotificationSink;

/// Registry shared between timer tasks, the daemon's socket handlers, and
/// the engine itself.
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// Outbound HTTP request timeout for poll cycles.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client poll cycles run with.
pub fn default_client() -> Result<reqwest::Client, PollError> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

struct MonitorTimer {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

pub struct PollEngine {
    home: PathBuf,
    registry: SharedRegistry,
    client: reqwest::Client,
    sink: Arc<dyn NotificationSink>,
    timers: HashMap<MonitorId, MonitorTimer>,
}

impl PollEngine {
    pub fn new(
        home: PathBuf,
        registry: SharedRegistry,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, PollError> {
        let client = default_client()?;
        Ok(Self {
            home,
            registry,
            client,
            sink,
            timers: HashMap::new(),
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Number of live timers. One per running monitor, never more.
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn is_running(&self, id: &MonitorId) -> bool {
        self.timers.contains_key(id)
    }

    /// Start the recurring timer for `id`: one immediate cycle, then one
    /// every `interval_seconds`. No-op if the monitor already has a timer.
    pub async fn start_monitor(&mut self, id: &MonitorId) -> Result<(), PollError> {
        if self.timers.contains_key(id) {
            tracing::debug!(monitor_id = %id, "start ignored: timer already active");
            return Ok(());
        }

        let interval_seconds = {
            let mut reg = self.registry.write().await;
            let monitor = reg.update(id, |m| m.is_running = true)?;
            let interval_seconds = monitor.interval_seconds;
            registry::save_at(&self.home, &reg)?;
            interval_seconds
        };

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let client = self.client.clone();
        let home = self.home.clone();
        let registry = self.registry.clone();
        let sink = self.sink.clone();
        let monitor_id = id.clone();

        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        tracing::debug!(monitor_id = %monitor_id, "timer task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        // Cycle errors surface through the sink; the next
                        // tick is the implicit retry.
                        let _ = cycle::run_cycle(
                            &client,
                            &home,
                            &registry,
                            &monitor_id,
                            sink.as_ref(),
                        )
                        .await;
                    }
                }
            }
        });

        self.timers.insert(
            id.clone(),
            MonitorTimer {
                handle,
                shutdown: shutdown_tx,
            },
        );
        tracing::info!(monitor_id = %id, interval_seconds, "monitor started");
        Ok(())
    }

    /// Cancel the recurring timer for `id` and clear its running flag.
    /// No-op for ids without an active timer or registry entry.
    ///
    /// The timer task is aborted outright, so an in-flight fetch is dropped
    /// with it; results of cancelled fetches are discarded, never applied.
    pub async fn stop_monitor(&mut self, id: &MonitorId) -> Result<(), PollError> {
        let had_timer = match self.timers.remove(id) {
            Some(timer) => {
                let _ = timer.shutdown.send(());
                timer.handle.abort();
                true
            }
            None => false,
        };

        let mut reg = self.registry.write().await;
        match reg.update(id, |m| m.is_running = false) {
            Ok(_) => registry::save_at(&self.home, &reg)?,
            // Stopping a deleted monitor is a no-op, not an error.
            Err(queuewatch_core::StoreError::MonitorNotFound(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        if had_timer {
            tracing::info!(monitor_id = %id, "monitor stopped");
        }
        Ok(())
    }

    /// Drain every timer without touching the durable `is_running` flags
    /// (daemon shutdown path). The flags on disk are the restore intent: a
    /// later `restore` resumes exactly the monitors that were running when
    /// the daemon went down.
    pub async fn stop_all(&mut self) {
        for (id, timer) in self.timers.drain() {
            let _ = timer.shutdown.send(());
            timer.handle.abort();
            tracing::debug!(monitor_id = %id, "timer drained for shutdown");
        }
    }

    /// Re-read the registry file, replacing in-memory state, after dropping
    /// the timer for `id` (all timers when `None`). Used when the registry
    /// file was edited externally; the file wins.
    ///
    /// Timers are dropped without a registry write so the external edit is
    /// not clobbered. Reloaded entries whose `is_running` flag disagrees
    /// with the surviving timers are reconciled (and persisted) afterwards,
    /// keeping the flag/timer invariant intact.
    pub async fn reload(&mut self, id: Option<&MonitorId>) -> Result<(), PollError> {
        match id {
            Some(id) => {
                if let Some(timer) = self.timers.remove(id) {
                    let _ = timer.shutdown.send(());
                    timer.handle.abort();
                }
            }
            None => {
                for (_, timer) in self.timers.drain() {
                    let _ = timer.shutdown.send(());
                    timer.handle.abort();
                }
            }
        }

        let mut reg = self.registry.write().await;
        *reg = registry::load_at(&self.home)?;

        // Timers whose monitor vanished from the file have nothing left to
        // poll for.
        let orphans: Vec<MonitorId> = self
            .timers
            .keys()
            .filter(|id| reg.get(id).is_none())
            .cloned()
            .collect();
        for id in orphans {
            if let Some(timer) = self.timers.remove(&id) {
                let _ = timer.shutdown.send(());
                timer.handle.abort();
            }
        }

        let stale: Vec<MonitorId> = reg
            .iter()
            .filter(|m| m.is_running != self.timers.contains_key(&m.id))
            .map(|m| m.id.clone())
            .collect();
        if !stale.is_empty() {
            for id in &stale {
                let has_timer = self.timers.contains_key(id);
                reg.update(id, |m| m.is_running = has_timer)?;
            }
            registry::save_at(&self.home, &reg)?;
        }
        tracing::info!(reloaded = reg.len(), "registry reloaded from disk");
        Ok(())
    }

    /// Start timers for every registry entry flagged `is_running`, giving
    /// continuity of polling across restarts. Idempotent start makes a
    /// double restore harmless.
    pub async fn restore(&mut self) -> Result<(), PollError> {
        let running: Vec<MonitorId> = {
            let reg = self.registry.read().await;
            reg.iter()
                .filter(|m| m.is_running)
                .map(|m| m.id.clone())
                .collect()
        };
        for id in running {
            self.start_monitor(&id).await?;
        }
        Ok(())
    }
}

impl Drop for PollEngine {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
