//! At most one copy execution per leader at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::models::AccountIndex;

/// Tracks leaders with an execution in flight.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    busy: Arc<Mutex<HashSet<AccountIndex>>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `leader`, or `None` if an execution for it is already running.
    /// The claim is released when the permit is dropped.
    pub fn try_acquire(&self, leader: AccountIndex) -> Option<InFlightPermit> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(leader) {
            return None;
        }
        Some(InFlightPermit {
            leader,
            busy: self.busy.clone(),
        })
    }

    #[cfg(test)]
    pub fn is_busy(&self, leader: AccountIndex) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&leader)
    }
}

#[derive(Debug)]
pub struct InFlightPermit {
    leader: AccountIndex,
    busy: Arc<Mutex<HashSet<AccountIndex>>>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.leader);
    }
}
