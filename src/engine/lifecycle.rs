//! Init-once lifecycle of the coordinator.
//!
//! At most one coordinator may be live per process. Construction claims the
//! process-wide slot with a check-and-set; the claim is released when the
//! returned guard drops. `reset` force-releases the slot for test isolation
//! or after a coordinator was leaked.

use crate::error::{HerdError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Proof that the caller owns the process-wide coordinator slot
#[derive(Debug)]
pub struct InstanceGuard {
    _private: (),
}

/// Claim the coordinator slot. Fails if another coordinator is live.
pub fn acquire() -> Result<InstanceGuard> {
    ACTIVE
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .map_err(|_| HerdError::AlreadyRunning)?;
    debug!("Coordinator instance claimed");
    Ok(InstanceGuard { _private: () })
}

/// Whether a coordinator currently holds the slot
pub fn is_active() -> bool {
    ACTIVE.load(Ordering::Acquire)
}

/// Release the slot regardless of who holds it
pub fn reset() {
    ACTIVE.store(false, Ordering::Release);
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::Release);
        debug!("Coordinator instance released");
    }
}

/// Serializes unit tests that construct coordinators
#[cfg(test)]
pub(crate) static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_instance() {
        let _serial = TEST_LOCK.lock();
        reset();

        let guard = acquire().unwrap();
        assert!(is_active());
        assert!(matches!(acquire(), Err(HerdError::AlreadyRunning)));

        drop(guard);
        assert!(!is_active());
        let _again = acquire().unwrap();
    }

    #[test]
    fn test_reset_releases_leaked_guard() {
        let _serial = TEST_LOCK.lock();
        reset();

        std::mem::forget(acquire().unwrap());
        assert!(acquire().is_err());

        reset();
        assert!(acquire().is_ok());
    }
}
