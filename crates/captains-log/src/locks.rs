//! Per-scope mutual exclusion for fetch-and-advance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use captains_types::WatermarkKey;

/// Table size above which idle slots are reclaimed.
const EVICTION_THRESHOLD: usize = 1024;

type Slot = Arc<Mutex<()>>;

/// In-process lock table keyed by watermark key.
///
/// Holding a key's slot serializes fetches on that key only; callers on
/// other keys never wait on it. Cloning shares the table.
#[derive(Clone, Debug, Default)]
pub struct ScopeLocks {
    table: Arc<Mutex<HashMap<WatermarkKey, Slot>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `key`.
    pub fn with_scope<T>(&self, key: &WatermarkKey, f: impl FnOnce() -> T) -> T {
        self.with_scopes(std::slice::from_ref(key), f)
    }

    /// Runs `f` while holding the locks for every key in `keys`.
    ///
    /// Locks are taken in key order whatever order `keys` is in, so two
    /// callers with overlapping key sets cannot deadlock. Repeated keys are
    /// locked once.
    pub fn with_scopes<T>(&self, keys: &[WatermarkKey], f: impl FnOnce() -> T) -> T {
        let mut ordered: Vec<&WatermarkKey> = keys.iter().collect();
        ordered.sort_unstable();
        ordered.dedup();

        let slots: Vec<Slot> = ordered.into_iter().map(|key| self.slot(key)).collect();
        // The slots guard no data, so a poisoned lock is still a valid lock.
        let _guards: Vec<MutexGuard<'_, ()>> = slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .collect();
        f()
    }

    /// Number of slots currently in the table.
    pub fn len(&self) -> usize {
        self.lock_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &WatermarkKey) -> Slot {
        let mut table = self.lock_table();

        // A slot referenced only by the table has no holder and no waiter.
        if table.len() > EVICTION_THRESHOLD {
            table.retain(|_, slot| Arc::strong_count(slot) > 1);
        }

        table.entry(key.clone()).or_default().clone()
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<WatermarkKey, Slot>> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("scope lock table poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
