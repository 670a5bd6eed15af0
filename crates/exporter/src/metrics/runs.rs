//! Edge detection for run counters.

use std::collections::HashMap;
use std::sync::Mutex;

/// Remembers the last (id, status) seen per series key.
#[derive(Debug, Default)]
pub struct RunTracker {
    last: Mutex<HashMap<Vec<String>, (u64, String)>>,
}

impl RunTracker {
    /// Record an observation. Returns true when it is the first for `key` or
    /// differs from the previous one, i.e. when the run counter should move.
    pub fn observe(&self, key: &[&str], id: u64, status: &str) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let key: Vec<String> = key.iter().map(|s| s.to_string()).collect();
        match last.get(&key) {
            Some((prev_id, prev_status)) if *prev_id == id && prev_status == status => false,
            _ => {
                last.insert(key, (id, status.to_string()));
                true
            }
        }
    }
}
