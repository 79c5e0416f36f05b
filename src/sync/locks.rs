use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// One async lock per listing reference, so at most one unit of work
/// touches a given listing at a time.
#[derive(Clone, Default)]
pub struct RefLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl RefLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, reference: i64) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() > PRUNE_THRESHOLD {
                // Nobody else holds these, drop them
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(reference).or_default().clone()
        };
        entry.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
