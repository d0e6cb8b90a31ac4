//! Monitor registry: in-memory collection + durable JSON persistence.
//!
//! # Storage layout
//!
//! ```text
//! ~/.queuewatch/
//!   monitors.json   (JSON array of all MonitorConfig entries: mode 0600)
//! ```
//!
//! The whole registry is one file: read once at startup, rewritten atomically
//! on every mutation.
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{MonitorConfig, MonitorId};

pub const STORE_FILE: &str = "monitors.json";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.queuewatch/`: pure, no I/O.
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".queuewatch")
}

/// `<home>/.queuewatch/monitors.json`: pure, no I/O.
pub fn store_path_at(home: &Path) -> PathBuf {
    root_at(home).join(STORE_FILE)
}

// ---------------------------------------------------------------------------
// 2. In-memory collection
// ---------------------------------------------------------------------------

/// Ordered set of monitor configurations, keyed by id.
///
/// Serializes as a bare JSON array, matching the on-disk format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    monitors: Vec<MonitorConfig>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitorConfig> {
        self.monitors.iter()
    }

    pub fn get(&self, id: &MonitorId) -> Option<&MonitorConfig> {
        self.monitors.iter().find(|m| &m.id == id)
    }

    /// Insert a freshly created monitor and return a reference to it.
    pub fn insert(&mut self, monitor: MonitorConfig) -> &MonitorConfig {
        self.monitors.push(monitor);
        self.monitors.last().expect("just pushed")
    }

    /// Apply `mutate` to the entry for `id` and bump its `updated_at`.
    pub fn update<F>(&mut self, id: &MonitorId, mutate: F) -> Result<&MonitorConfig, StoreError>
    where
        F: FnOnce(&mut MonitorConfig),
    {
        let monitor = self
            .monitors
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| StoreError::MonitorNotFound(id.clone()))?;
        mutate(monitor);
        monitor.updated_at = Utc::now();
        Ok(monitor)
    }

    /// Remove and return the entry for `id`.
    pub fn remove(&mut self, id: &MonitorId) -> Result<MonitorConfig, StoreError> {
        let index = self
            .monitors
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| StoreError::MonitorNotFound(id.clone()))?;
        Ok(self.monitors.remove(index))
    }
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load the registry from `<home>/.queuewatch/monitors.json`.
///
/// A missing file is an empty registry, not an error.
/// Malformed JSON yields `StoreError::Parse` with the path for context.
pub fn load_at(home: &Path) -> Result<Registry, StoreError> {
    let path = store_path_at(home);
    if !path.exists() {
        return Ok(Registry::new());
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_json::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Registry, StoreError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the registry to `<home>/.queuewatch/monitors.json`.
///
/// Write flow: serialize → `.json.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem).
pub fn save_at(home: &Path, registry: &Registry) -> Result<(), StoreError> {
    let dir = root_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }

    let path = store_path_at(home);
    let tmp_path = path.with_file_name(format!("{STORE_FILE}.tmp"));

    let json = serde_json::to_string_pretty(registry)?;
    std::fs::write(&tmp_path, json)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(registry: &Registry) -> Result<(), StoreError> {
    save_at(&home()?, registry)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
