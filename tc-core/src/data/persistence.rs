//! Key-value persistence for control state
//!
//! The daemon seeds its control state from a `StateStore` at startup and
//! writes changed fields back best-effort. The bundled implementation is a
//! flat JSON map on disk with atomic writes (temp file + rename).

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ControlError, Result};

/// Well-known state store keys
pub mod keys {
    pub const SETPOINT_F: &str = "setpoint_f";
    pub const KP: &str = "pid_kp";
    pub const KI: &str = "pid_ki";
    pub const KD: &str = "pid_kd";
    pub const MODE: &str = "mode";
    pub const SELECTED_SENSOR: &str = "selected_sensor";
    pub const OVERRIDE: &str = "manual_override";
    pub const HEATING_ENABLED: &str = "heating_enabled";
    pub const COOLING_ENABLED: &str = "cooling_enabled";
    pub const LAST_DECISION: &str = "last_decision";
    pub const AGGREGATE_TEMPERATURE: &str = "aggregate_temperature";
    pub const PID_VALUE: &str = "pid_value";
}

/// Persistent key-value store for control state.
///
/// Absence is a first-class outcome: `get` returns `Ok(None)` when a key has
/// never been written, and callers fall back to documented defaults.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Read a float-valued key, falling back to `default` when absent or garbled
pub fn read_f64(store: &dyn StateStore, key: &str, default: f64) -> f64 {
    match store.get(key) {
        Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, raw, "Unparseable persisted value, using default");
            default
        }),
        Ok(None) => default,
        Err(e) => {
            warn!(key, error = %e, "State store read failed, using default");
            default
        }
    }
}

/// Read a bool-valued key ("true"/"false"), falling back to `default`
pub fn read_bool(store: &dyn StateStore, key: &str, default: bool) -> bool {
    match store.get(key) {
        Ok(Some(raw)) => match raw.trim() {
            "true" | "True" => true,
            "false" | "False" => false,
            other => {
                warn!(key, raw = other, "Unparseable persisted flag, using default");
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            warn!(key, error = %e, "State store read failed, using default");
            default
        }
    }
}

/// Set a key, logging instead of failing. Persistence is best-effort by
/// contract; a dead store must never fail a request handler or a tick.
pub fn set_best_effort(store: &dyn StateStore, key: &str, value: &str) {
    if let Err(e) = store.set(key, value) {
        warn!(key, error = %e, "Best-effort persistence failed");
    }
}

/// JSON-file backed state store with an in-memory cache.
///
/// The whole map is rewritten on every `set`; the file is small (a dozen
/// keys) and the atomic rename keeps readers from ever seeing a torn write.
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or create the parent of) the store at `path`. A missing file is
    /// an empty store, not an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| ControlError::FileRead {
                path: path.clone(),
                source: e,
            })?;
            serde_json::from_str(&contents)?
        } else {
            debug!(path = %path.display(), "No state file found, starting empty");
            HashMap::new()
        };
        Ok(Self {
            path,
            cache: Mutex::new(map),
        })
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(map)?;

        // Atomic write - write to temp file then rename
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ControlError::FileWrite {
            path: temp_path.clone(),
            source: e,
        })?;
        file.write_all(json.as_bytes())
            .map_err(|e| ControlError::FileWrite {
                path: temp_path.clone(),
                source: e,
            })?;
        file.sync_all().map_err(|e| ControlError::FileWrite {
            path: temp_path.clone(),
            source: e,
        })?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| ControlError::FileWrite {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self.cache.lock();
        cache.insert(key.to_string(), value.to_string());
        self.write_map(&cache)
    }
}
