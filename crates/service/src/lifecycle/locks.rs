use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the whole of one lifecycle operation on one protocol.
pub type ProtocolGuard = OwnedMutexGuard<()>;

/// One mutex per protocol identifier. Acquisition never waits: a protocol that is
/// already owned by an operation reports `None` and the caller answers `Busy`.
#[derive(Default)]
pub struct ProtocolLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProtocolLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, name: &str) -> Option<ProtocolGuard> {
        let lock = self.locks.entry(name.to_string()).or_default().clone();
        lock.try_lock_owned().ok()
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.locks.get(name).map(|l| l.try_lock().is_err()).unwrap_or(false)
    }
}
