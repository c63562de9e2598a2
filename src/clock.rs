//! The "now" clock collaborator.
//!
//! The core only ever needs a source of monotonically non-decreasing ids for
//! [`State::meta::id`](crate::state::Meta::id) — never wall-clock time for scheduling. Consumers
//! may inject their own [`IdClock`] (useful in tests, where a deterministic sequence is needed);
//! the default is a process-local atomic counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A source of monotonically non-decreasing navigation ids.
pub trait IdClock: Send + Sync {
    /// Returns the next id. Must never return a value smaller than a previously returned one.
    fn next_id(&self) -> u64;
}

/// The default [`IdClock`]: a simple atomic counter starting at 1 (0 is reserved to mean
/// "no id assigned yet").
#[derive(Debug, Default)]
pub struct AtomicIdClock {
    counter: AtomicU64,
}

impl AtomicIdClock {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl IdClock for AtomicIdClock {
    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A shared handle to an [`IdClock`].
pub type SharedIdClock = Arc<dyn IdClock>;

/// Constructs the default shared clock.
pub fn default_clock() -> SharedIdClock {
    Arc::new(AtomicIdClock::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_monotonically() {
        let clock = AtomicIdClock::new();
        let a = clock.next_id();
        let b = clock.next_id();
        let c = clock.next_id();
        assert!(a < b);
        assert!(b < c);
    }

    struct FixedClock(AtomicU64);

    impl IdClock for FixedClock {
        fn next_id(&self) -> u64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    #[test]
    fn custom_clock_can_be_injected() {
        let clock: SharedIdClock = Arc::new(FixedClock(AtomicU64::new(100)));
        assert_eq!(clock.next_id(), 100);
        assert_eq!(clock.next_id(), 101);
    }
}
