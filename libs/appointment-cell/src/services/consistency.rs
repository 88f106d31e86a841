// libs/appointment-cell/src/services/consistency.rs
//
// Per-(clinic, doctor) critical section around check-then-write. Cross-process
// races are closed by the appointments_no_overlap exclusion constraint.
//

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::models::AppointmentError;

const PRUNE_THRESHOLD: usize = 1024;

type LockKey = (Uuid, Uuid);

#[derive(Default)]
pub struct SchedulingLocks {
    locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl SchedulingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other booking for this doctor is between its conflict
    /// check and its write. The guard releases on drop.
    pub async fn acquire(&self, clinic_id: Uuid, doctor_id: Uuid) -> Result<OwnedMutexGuard<()>, AppointmentError> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| AppointmentError::DatabaseError("scheduling lock table poisoned".to_string()))?;

            if locks.len() >= PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            Arc::clone(locks.entry((clinic_id, doctor_id)).or_default())
        };

        debug!("Acquiring scheduling lock for doctor {} in clinic {}", doctor_id, clinic_id);
        Ok(lock.lock_owned().await)
    }

    pub fn tracked_keys(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
