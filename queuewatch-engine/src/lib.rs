//! Queuewatch poll engine: fetch → parse → extract → diff, plus per-monitor
//! recurring timers and the notification sink they report through.
//!
//! The engine owns exactly one timer task per running monitor. Registry
//! entries are shared behind an async lock; every cycle that mutates an entry
//! persists the whole registry before releasing the write lock.

mod cycle;
mod engine;
mod error;
mod extract;
mod notify;

pub use cycle::{evaluate, poll_once, run_cycle, CycleOutcome};
pub use engine::{default_client, PollEngine, SharedRegistry};
pub use error::PollError;
pub use extract::{extract_record, parse_body, slug_of_value, Extracted};
pub use notify::{Notification, NotificationSink, Severity, TracingSink};
