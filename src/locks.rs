use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{ Mutex as AsyncMutex, OwnedMutexGuard };

/// One async mutex per conversation id.
///
/// Entries are created on demand and dropped once no caller holds or waits
/// on them, so the map only grows with in-flight ids.
#[derive(Default)]
pub struct KeyedLocks {
    slots: DashMap<String, Arc<AsyncMutex<()>>>,
}

pub struct KeyedGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        // The shard guard must be gone before awaiting.
        let slot = Arc::clone(&self.slots.entry(key.to_string()).or_default());
        let guard = slot.lock_owned().await;
        KeyedGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Release first so the strong count below reflects only the map and waiters.
        drop(self.guard.take());
        self.owner.slots.remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
