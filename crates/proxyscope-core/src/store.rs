// ── Key-value config store ──
//
// The facade persists small bits of view state (mode, refresh interval)
// through this seam and never touches storage directly.

use std::fmt;

use dashmap::DashMap;

pub const VIEW_MODE_KEY: &str = "connections.view_mode";
pub const REFRESH_INTERVAL_KEY: &str = "connections.refresh_interval_ms";

/// Injected string store with get/set/remove.
pub trait ConfigStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// Process-local store, the default when nothing is injected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}
