use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Keyed mutual exclusion over slot identifiers.
///
/// Every read-check-write sequence touching a slot's bookable state
/// (reservation, schedule status changes, advisory lock acquisition) runs
/// while holding the guard for that slot, so two concurrent operations on
/// the same slot always observe each other's writes.
#[derive(Clone, Default)]
pub struct SlotGuards {
    inner: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl SlotGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the exclusive guard for `slot_id`, waiting for any holder of
    /// the same slot to finish first. Operations on distinct slots do not
    /// contend.
    pub async fn acquire(&self, slot_id: Uuid) -> OwnedMutexGuard<()> {
        let slot_mutex = {
            let mut map = self.inner.lock().unwrap();
            Arc::clone(map.entry(slot_id).or_default())
        };
        slot_mutex.lock_owned().await
    }
}
