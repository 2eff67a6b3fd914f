use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = HashMap<Uuid, Arc<Mutex<()>>>;

/// One async mutex per specialist, held across the availability check and the insert.
/// An entry lives only while someone holds or waits for it.
#[derive(Default)]
pub struct SpecialistLocks {
    locks: StdMutex<LockMap>,
}

/// Held lock for one specialist. Dropping it releases the lock and forgets
/// the entry when nobody else is waiting.
pub struct SpecialistGuard<'a> {
    owner: &'a SpecialistLocks,
    specialist_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SpecialistLocks {
    pub fn new() -> Self {
        Self::default()
    }

    // Only synchronous work happens under the map lock
    fn map(&self) -> StdMutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn acquire(&self, specialist_id: Uuid) -> SpecialistGuard<'_> {
        let lock = self.map().entry(specialist_id).or_default().clone();

        SpecialistGuard {
            owner: self,
            specialist_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Specialists with a live entry.
    pub fn tracked(&self) -> usize {
        self.map().len()
    }
}

impl Drop for SpecialistGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.owner.map();
        if locks.get(&self.specialist_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.specialist_id);
        }
    }
}
