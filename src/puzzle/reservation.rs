use std::collections::HashSet;

use parking_lot::{Mutex, MutexGuard};

use super::Seed;

/// Seeds already handed out during this process. Never persisted
#[derive(Debug, Default)]
pub struct ReservationSet {
    reserved: Mutex<HashSet<Seed>>,
}

impl ReservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds the set for a whole check-then-mark sequence
    pub(crate) fn lock(&self) -> MutexGuard<'_, HashSet<Seed>> {
        self.reserved.lock()
    }

    pub fn is_reserved(&self, seed: &str) -> bool {
        self.reserved.lock().contains(seed)
    }

    pub fn len(&self) -> usize {
        self.reserved.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
