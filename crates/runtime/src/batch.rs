use std::collections::VecDeque;

use crate::budget::FrameBudget;

/// Debounced FIFO of pending work.
///
/// Key properties:
/// - Items drain in enqueue order.
/// - The deadline is armed by the first enqueue after a drain and is not
///   pushed back by later enqueues, so a steady stream still flushes every
///   `delay_ms`.
/// - An explicit batch (`begin_batch`/`commit_batch`) suspends firing; the
///   caller drains when the outermost batch commits.
/// - `cancel` drops pending items without handing them to anyone.
#[derive(Debug)]
pub struct BatchQueue<T> {
    pending: VecDeque<T>,
    delay_ms: u64,
    deadline_ms: Option<u64>,
    batch_depth: u32,
}

impl<T> BatchQueue<T> {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            pending: VecDeque::new(),
            delay_ms,
            deadline_ms: None,
            batch_depth: 0,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.deadline_ms
    }

    pub fn push(&mut self, item: T, now_ms: u64) {
        self.pending.push_back(item);
        self.arm(now_ms);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>, now_ms: u64) {
        let before = self.pending.len();
        self.pending.extend(items);
        if self.pending.len() > before {
            self.arm(now_ms);
        }
    }

    fn arm(&mut self, now_ms: u64) {
        if self.deadline_ms.is_none() {
            self.deadline_ms = Some(now_ms.saturating_add(self.delay_ms));
        }
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    /// True when the timer would fire at `now_ms`.
    pub fn is_due(&self, now_ms: u64) -> bool {
        !self.in_batch()
            && !self.pending.is_empty()
            && self.deadline_ms.is_some_and(|d| now_ms >= d)
    }

    /// Drains everything, regardless of deadline or batch state.
    pub fn take_all(&mut self) -> Vec<T> {
        self.deadline_ms = None;
        self.pending.drain(..).collect()
    }

    /// Drains up to the budget, oldest first.
    ///
    /// When items remain, the deadline stays armed so the next tick resumes
    /// where this one stopped.
    pub fn take_budgeted(&mut self, budget: &mut FrameBudget) -> Vec<T> {
        let n = budget.consume_up_to(self.pending.len());
        let out: Vec<T> = self.pending.drain(..n).collect();
        if self.pending.is_empty() {
            self.deadline_ms = None;
        }
        out
    }

    /// Drops pending items and disarms the timer. Returns how many were dropped.
    pub fn cancel(&mut self) -> usize {
        self.deadline_ms = None;
        self.batch_depth = 0;
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Ends one level of batching. Returns `true` when the outermost batch
    /// closed, which is the caller's cue to drain.
    pub fn commit_batch(&mut self) -> bool {
        if self.batch_depth == 0 {
            return false;
        }
        self.batch_depth -= 1;
        self.batch_depth == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.pending.iter()
    }
}
