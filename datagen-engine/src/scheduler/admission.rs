//! Single-job admission gate
//!
//! One slot holding the id of the job currently running, or nothing.
//! A permit is handed out per admitted job and frees the slot when dropped,
//! including when the job task panics.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Default)]
pub struct AdmissionGate {
    slot: Arc<Mutex<Option<Uuid>>>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `job_id` if no other job is running
    ///
    /// # Errors
    /// `JobAlreadyRunning` with the id of the job holding the slot
    pub fn try_acquire(&self, job_id: Uuid) -> Result<AdmissionPermit> {
        let mut slot = lock(&self.slot);
        if let Some(running) = *slot {
            return Err(EngineError::JobAlreadyRunning(running));
        }
        *slot = Some(job_id);
        debug!("Admitted job {}", job_id);

        Ok(AdmissionPermit {
            slot: Arc::clone(&self.slot),
            job_id,
        })
    }

    /// Id of the job holding the slot
    pub fn running(&self) -> Option<Uuid> {
        *lock(&self.slot)
    }
}

/// Proof of admission; releases the slot on drop
#[derive(Debug)]
pub struct AdmissionPermit {
    slot: Arc<Mutex<Option<Uuid>>>,
    job_id: Uuid,
}

impl AdmissionPermit {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if *slot == Some(self.job_id) {
            *slot = None;
            debug!("Released admission slot held by job {}", self.job_id);
        }
    }
}

// The slot is a plain Option, so a poisoned lock still holds a usable value.
fn lock(slot: &Mutex<Option<Uuid>>) -> MutexGuard<'_, Option<Uuid>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_job_is_refused() {
        let gate = AdmissionGate::new();
        let first = Uuid::new_v4();
        let _permit = gate.try_acquire(first).unwrap();

        let err = gate.try_acquire(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, EngineError::JobAlreadyRunning(id) if id == first));
        assert_eq!(gate.running(), Some(first));
    }

    #[test]
    fn test_slot_is_released_on_drop() {
        let gate = AdmissionGate::new();
        let permit = gate.try_acquire(Uuid::new_v4()).unwrap();
        drop(permit);

        assert_eq!(gate.running(), None);
        assert!(gate.try_acquire(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_clones_share_the_slot() {
        let gate = AdmissionGate::new();
        let other = gate.clone();
        let _permit = gate.try_acquire(Uuid::new_v4()).unwrap();
        assert!(other.try_acquire(Uuid::new_v4()).is_err());
    }
}
