//! Update Scheduler
//!
//! The scheduler decides when and in which order dirty computations re-run.
//!
//! # Algorithm
//!
//! 1. A write marks every subscriber of the written cell dirty and pushes it
//!    onto the dirty queue (at most once, guarded by the computation's own
//!    dirty flag).
//! 2. The first push since the last flush schedules a `Flush` microtask that
//!    remembers the queue generation at scheduling time.
//! 3. When the microtask runs, a generation mismatch means the queue changed
//!    since scheduling; the flush is rescheduled instead of running on a
//!    stale snapshot.
//! 4. Otherwise the queue is sorted by rank and drained lowest rank first.
//!    If a run changes the queue, the pass stops and a fresh flush is
//!    scheduled, so every run sees a complete topological order.
//!
//! Every push and pop bumps the generation, so a removal followed by an
//! insertion is detected even though the length is unchanged.

use std::collections::VecDeque;

use super::node::ComputationId;

/// The queue of dirty computations awaiting a flush.
#[derive(Debug, Default)]
pub(crate) struct DirtyQueue {
    entries: VecDeque<ComputationId>,
    generation: u64,
}

impl DirtyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a computation. Returns `true` when it is the only entry, which
    /// is the signal to schedule a flush.
    pub fn push(&mut self, id: ComputationId) -> bool {
        self.entries.push_back(id);
        self.generation += 1;
        self.entries.len() == 1
    }

    /// Remove the first entry.
    pub fn pop_front(&mut self) -> Option<ComputationId> {
        let id = self.entries.pop_front()?;
        self.generation += 1;
        Some(id)
    }

    /// Sort ascending by rank. The sort is stable, so equal ranks keep
    /// their enqueue order.
    pub fn sort_by_rank(&mut self, rank: impl Fn(ComputationId) -> u32) {
        self.entries.make_contiguous().sort_by_key(|id| rank(*id));
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.generation += 1;
        }
    }
}

/// Deferred work, run one step after it was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Microtask {
    /// Drain the dirty queue if its generation still equals `expected`.
    Flush { expected: u64 },
}

/// FIFO of pending microtasks.
#[derive(Debug, Default)]
pub(crate) struct Microtasks {
    tasks: VecDeque<Microtask>,
}

impl Microtasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, task: Microtask) {
        self.tasks.push_back(task);
    }

    pub fn next(&mut self) -> Option<Microtask> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}
