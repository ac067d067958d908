//! RAII slot handle.

use std::sync::Arc;

use super::budget::SlotBudget;

/// One held Active slot. Returned to the budget on drop, however the worker
/// task ends.
#[derive(Debug)]
pub struct SlotGuard {
    budget: Arc<SlotBudget>,
}

impl SlotGuard {
    pub(super) fn new(budget: Arc<SlotBudget>) -> Self {
        Self { budget }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.budget.release();
    }
}
