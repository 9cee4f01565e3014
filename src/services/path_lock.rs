use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Process-wide registry of destination paths currently being written.
///
/// Contention is resolved by immediate rejection, never by queueing: a
/// writer that fails to acquire must surface a conflict to the caller
/// instead of waiting. Entries live only in memory; a process restart
/// clears the registry, which is safe because no upload survives a
/// restart either.
#[derive(Debug, Clone, Default)]
pub struct PathLockRegistry {
    held: Arc<DashMap<String, ()>>,
}

impl PathLockRegistry {
    pub fn new() -> Self {
        Self {
            held: Arc::new(DashMap::new()),
        }
    }

    /// Registers the path as held and returns `true`, or returns `false`
    /// without side effects if it is already held.
    pub fn try_acquire(&self, path: &str) -> bool {
        match self.held.entry(path.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(());
                true
            }
        }
    }

    /// Removes the path from the registry, returning whether it was held.
    pub fn release(&self, path: &str) -> bool {
        self.held.remove(path).is_some()
    }

    pub fn is_held(&self, path: &str) -> bool {
        self.held.contains_key(path)
    }
}
