//! The shared, append-only set of known projects.
//!
//! Readers take an immutable snapshot; the single writer (the orchestrator's
//! discovery step) publishes a new copy under the lock.

use std::sync::{Arc, RwLock};

use pipewatch_core::Project;

/// Projects unique by name, published as immutable snapshots.
#[derive(Debug, Default)]
pub struct ProjectStore {
    current: RwLock<Arc<Vec<Project>>>,
}

impl ProjectStore {
    /// Seed the store, dropping later duplicates of a name.
    pub fn new(projects: impl IntoIterator<Item = Project>) -> Self {
        let store = Self::default();
        for project in projects {
            store.insert_if_absent(project);
        }
        store
    }

    /// The list as visible right now. Later inserts do not affect it.
    pub fn snapshot(&self) -> Arc<Vec<Project>> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Append `project` unless a project with the same name exists.
    /// Existing entries are never replaced. Returns whether it was added.
    pub fn insert_if_absent(&self, project: Project) -> bool {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        if guard.iter().any(|p| p.name == project.name) {
            return false;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(project);
        *guard = Arc::new(next);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().iter().any(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
