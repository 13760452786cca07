//! Per-source mutual exclusion
//!
//! Two concurrent runs over the same source would both read watermark N and
//! insert the same row range. Holding the source's lock from watermark read
//! through commit serializes them within this process; the conditional
//! watermark write in the store covers other processes.
//!
//! Entries live only while a run holds or waits for them, so arbitrary
//! upload names do not accumulate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<Mutex<()>>>;

#[derive(Clone, Default)]
pub struct SourceLocks {
    inner: Arc<StdMutex<LockMap>>,
}

/// Exclusive access to one source; released on drop
pub struct SourceGuard {
    guard: Option<OwnedMutexGuard<()>>,
    source_id: String,
    map: Arc<StdMutex<LockMap>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `source_id`
    pub async fn acquire(&self, source_id: &str) -> SourceGuard {
        let lock = {
            let mut map = lock_map(&self.inner);
            Arc::clone(map.entry(source_id.to_string()).or_default())
        };

        SourceGuard {
            guard: Some(lock.lock_owned().await),
            source_id: source_id.to_string(),
            map: Arc::clone(&self.inner),
        }
    }

    /// Sources currently held or waited on
    pub fn tracked(&self) -> usize {
        lock_map(&self.inner).len()
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        // Release first so the map holds the last reference when idle
        drop(self.guard.take());

        let mut map = lock_map(&self.map);
        let idle = map
            .get(&self.source_id)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if idle {
            map.remove(&self.source_id);
        }
    }
}

// The map is only touched in short non-panicking sections; a poisoned
// lock still holds a consistent map.
fn lock_map(map: &StdMutex<LockMap>) -> StdMutexGuard<'_, LockMap> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
