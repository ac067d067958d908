//! Active-slot budget shared by all workers.
//!
//! Each Active job holds exactly one slot from admission until its worker
//! task ends, so `in_use` never exceeds the configured cap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::guard::SlotGuard;

#[derive(Debug)]
pub struct SlotBudget {
    max: usize,
    in_use: AtomicUsize,
}

impl SlotBudget {
    /// Create a budget with the given maximum (from `max_active`).
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            max: max.max(1),
            in_use: AtomicUsize::new(0),
        })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Free slots. May be 0 when every slot is held.
    pub fn available(&self) -> usize {
        self.max.saturating_sub(self.in_use())
    }

    /// Take one slot if any is free. The slot returns when the guard drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return None;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(SlotGuard::new(Arc::clone(self))),
                Err(actual) => current = actual,
            }
        }
    }

    pub(super) fn release(&self) {
        let prev = self.in_use.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "slot released twice");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_until_full_then_release() {
        let budget = SlotBudget::new(2);
        assert_eq!(budget.available(), 2);
        let a = budget.try_acquire().unwrap();
        let b = budget.try_acquire().unwrap();
        assert_eq!(budget.in_use(), 2);
        assert!(budget.try_acquire().is_none());
        drop(a);
        assert_eq!(budget.available(), 1);
        let c = budget.try_acquire().unwrap();
        drop(b);
        drop(c);
        assert_eq!(budget.in_use(), 0);
    }

    #[test]
    fn concurrent_acquire_never_exceeds_cap() {
        let budget = SlotBudget::new(8);
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let budget = Arc::clone(&budget);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if let Some(guard) = budget.try_acquire() {
                            peak.fetch_max(budget.in_use(), Ordering::SeqCst);
                            drop(guard);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 8);
        assert_eq!(budget.in_use(), 0);
    }

    #[test]
    fn zero_cap_is_clamped_to_one() {
        let budget = SlotBudget::new(0);
        assert_eq!(budget.max(), 1);
    }
}
