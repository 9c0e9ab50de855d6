//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a cell is read,
//! the current computation is registered as a subscriber.
//!
//! # Implementation
//!
//! Each runtime keeps a stack of active computations. Running a computation
//! pushes a frame; the frame is popped when the run completes. Nested runs
//! happen when a read lazily brings an upstream computation up to date.
//!
//! Every frame carries its own reentrancy backup map. When a cell that was
//! already read by an enclosing run is read by a nested run, the enclosing
//! reader is stashed in the nested frame's map and restored when the nested
//! run reconciles its dependencies. Because the map lives in the frame, the
//! caller's bookkeeping is restored automatically on exit.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::graph::{CellId, ComputationId};

/// Readers displaced by a nested run, keyed by the cell they were reading.
pub(crate) type Backup = HashMap<CellId, ComputationId>;

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    computation: ComputationId,
    backup: Option<Backup>,
}

/// The stack of executing computations for one runtime.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    frames: Vec<ContextEntry>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// The computation currently executing, if any.
    pub fn current(&self) -> Option<ComputationId> {
        self.frames.last().map(|entry| entry.computation)
    }

    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Remember that `reader` was reading `cell` before the current run took over.
    pub fn stash_reader(&mut self, cell: CellId, reader: ComputationId) {
        if let Some(entry) = self.frames.last_mut() {
            entry.backup.get_or_insert_with(HashMap::new).insert(cell, reader);
        }
    }

    fn push(&mut self, computation: ComputationId) {
        self.frames.push(ContextEntry {
            computation,
            backup: None,
        });
    }

    fn pop(&mut self, computation: ComputationId) -> Option<Backup> {
        let entry = self.frames.pop()?;
        // Verify we're popping the right context.
        debug_assert_eq!(
            entry.computation, computation,
            "ReactiveContext mismatch: expected {:?}, got {:?}",
            computation, entry.computation
        );
        entry.backup
    }
}

/// Guard for one computation run.
///
/// Dropping the guard without calling [`ReactiveContext::exit`] (for example
/// while unwinding from a panicking procedure) still pops the frame, so the
/// enclosing computation becomes current again.
pub(crate) struct ReactiveContext<'a> {
    stack: &'a RefCell<ContextStack>,
    computation: ComputationId,
    exited: bool,
}

impl<'a> ReactiveContext<'a> {
    /// Make `computation` the current computation until the guard is exited.
    pub fn enter(stack: &'a RefCell<ContextStack>, computation: ComputationId) -> Self {
        stack.borrow_mut().push(computation);
        Self {
            stack,
            computation,
            exited: false,
        }
    }

    /// Pop the frame, returning the readers displaced during this run.
    pub fn exit(mut self) -> Option<Backup> {
        self.exited = true;
        self.stack.borrow_mut().pop(self.computation)
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        if !self.exited {
            self.stack.borrow_mut().pop(self.computation);
        }
    }
}
