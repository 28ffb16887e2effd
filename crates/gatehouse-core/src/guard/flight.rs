use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-slot "verification in flight" flag.
///
/// The slot is taken with `try_acquire` before a verification is dispatched
/// and released when the returned permit drops, so every exit path frees it,
/// including task cancellation.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct InFlightPermit(Arc<AtomicBool>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<InFlightPermit> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightPermit(self.0.clone()))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
