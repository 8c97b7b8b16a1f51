//! Persisted preferences.
//!
//! Preference storage is strictly best-effort: a broken backend degrades to
//! in-memory defaults and never surfaces as a fatal error. The cache keeps
//! the last written value so a flaky backend still reads back consistently
//! within the session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// The backend failed; callers fall back to defaults.
#[derive(Debug, Error)]
#[error("preference store unavailable: {0}")]
pub struct PreferenceError(pub String);

/// Backend storage for persisted preferences.
pub trait PreferenceStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>, PreferenceError>;
    fn store(&self, key: &str, value: &Value) -> Result<(), PreferenceError>;
}

/// In-memory backend; also the fallback of last resort.
#[derive(Default)]
pub struct MemoryPrefs {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryPrefs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPrefs {
    fn load(&self, key: &str) -> Result<Option<Value>, PreferenceError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn store(&self, key: &str, value: &Value) -> Result<(), PreferenceError> {
        self.entries.lock().insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Best-effort preference access over any backend.
pub struct Preferences {
    backend: Arc<dyn PreferenceStore>,
    cache: Mutex<HashMap<String, Value>>,
}

impl Preferences {
    pub fn new(backend: Arc<dyn PreferenceStore>) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Read a preference, falling back to the session cache and then the
    /// supplied default when the backend is unavailable.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        match self.backend.load(key) {
            Ok(Some(value)) => value,
            Ok(None) => self.cached(key).unwrap_or(default),
            Err(error) => {
                warn!(key, %error, "preference load failed; using default");
                self.cached(key).unwrap_or(default)
            }
        }
    }

    /// Write a preference. Always lands in the session cache; backend
    /// failures are logged and swallowed.
    pub fn set(&self, key: &str, value: Value) {
        self.cache.lock().insert(key.to_string(), value.clone());
        if let Err(error) = self.backend.store(key, &value) {
            warn!(key, %error, "preference store failed; kept in memory only");
        }
    }

    fn cached(&self, key: &str) -> Option<Value> {
        self.cache.lock().get(key).cloned()
    }
}
