/// Per-tick work budgeting for batch finalization.
///
/// Budgets are expressed in abstract "work units" (one unit per record
/// finalized) rather than wall-clock time, so a flush that is cut short
/// resumes deterministically on the next tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameBudget {
    remaining_units: u32,
}

impl FrameBudget {
    pub fn new(units: u32) -> Self {
        Self {
            remaining_units: units,
        }
    }

    /// A practically-unbounded budget, used by forced flushes.
    pub fn unlimited() -> Self {
        Self {
            remaining_units: u32::MAX,
        }
    }

    pub fn remaining_units(&self) -> u32 {
        self.remaining_units
    }

    /// Consumes as many of `wanted` units as remain and returns how many
    /// were granted.
    pub fn consume_up_to(&mut self, wanted: usize) -> usize {
        let granted = wanted.min(self.remaining_units as usize);
        self.remaining_units -= granted as u32;
        granted
    }
}
