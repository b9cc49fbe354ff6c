//! Issuance gate
//!
//! Single mutual-exclusion point around the whole provisioning path. Waiters are
//! admitted in arrival order (tokio's `Mutex` is fair).

use tokio::sync::{Mutex, MutexGuard};

/// Backend-wide serialization of Secret provisioning
#[derive(Debug, Default)]
pub struct IssuanceGate {
    lock: Mutex<()>,
}

/// Held for the duration of one provisioning attempt
#[derive(Debug)]
pub struct IssuancePermit<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl IssuanceGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other provisioning attempt is in flight
    pub async fn acquire(&self) -> IssuancePermit<'_> {
        IssuancePermit {
            _guard: self.lock.lock().await,
        }
    }

    /// Take the gate only if it is free
    pub fn try_acquire(&self) -> Option<IssuancePermit<'_>> {
        self.lock
            .try_lock()
            .ok()
            .map(|guard| IssuancePermit { _guard: guard })
    }
}
