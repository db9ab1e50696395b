//! Single-flight turn gate.
//!
//! At most one turn runs at a time. Attempts made while a turn is in flight
//! are rejected immediately; nothing is queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Admits at most one turn at a time.
#[derive(Debug, Clone, Default)]
pub struct TurnGate {
    busy: Arc<AtomicBool>,
}

impl TurnGate {
    /// Creates an idle gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to admit a turn.
    ///
    /// Returns `None` if a turn is already in flight. The gate stays busy
    /// until the returned permit is dropped.
    #[must_use]
    pub fn try_acquire(&self) -> Option<TurnPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TurnPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Returns whether a turn is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Runs `turn` if the gate is idle, releasing it however the future ends.
    ///
    /// Returns `None` without polling `turn` if the gate is busy.
    pub async fn run_exclusive<F, T>(&self, turn: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self.try_acquire()?;
        Some(turn.await)
    }
}

/// Proof of admission. Releases the gate on drop.
#[derive(Debug)]
pub struct TurnPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
