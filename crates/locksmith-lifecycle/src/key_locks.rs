use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

/// Per-key mutexes serializing same-key operations inside one process.
///
/// Without it, concurrent calls on one key race at the filesystem and in the
/// credential store (last writer wins). Different keys never contend.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutex for `key`. Lock it for the duration of the operation.
    pub fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // drop entries nobody is holding
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.to_string()).or_default().clone()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
