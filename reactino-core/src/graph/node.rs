//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph:
//! cells (value-or-error slots) and computations (re-runnable procedures
//! that own exactly one cell).

use std::any::Any;
use std::fmt;

use indexmap::IndexSet;
use smallvec::SmallVec;

/// Stable handle to a cell in the graph arena.
///
/// Slots are recycled after disposal; the generation tells a stale handle
/// apart from the node that took its slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    index: u32,
    generation: u32,
}

/// Stable handle to a computation in the graph arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId {
    index: u32,
    generation: u32,
}

macro_rules! arena_id {
    ($ty:ident, $label:literal) => {
        impl $ty {
            /// Build a first-generation id from its raw index.
            pub fn from_raw(raw: u32) -> Self {
                Self::new(raw, 0)
            }

            pub(crate) fn new(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            /// Get the raw slot index.
            pub fn raw(&self) -> u32 {
                self.index
            }

            /// How many times the slot was recycled before this node took it.
            pub fn generation(&self) -> u32 {
                self.generation
            }

            pub(crate) fn index(self) -> usize {
                self.index as usize
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.index)?;
                if self.generation > 0 {
                    write!(f, "v{}", self.generation)?;
                }
                Ok(())
            }
        }
    };
}

arena_id!(CellId, "Cell");
arena_id!(ComputationId, "Computation");

/// A cell's value, type-erased. Always a `Result<T, ReactiveError>` for the
/// `T` the cell was created with.
pub(crate) type StoredValue = Box<dyn Any>;

/// Compares two stored values of the same cell for write suppression.
pub(crate) type SameFn = fn(&dyn Any, &dyn Any) -> bool;

/// A computation body: runs the user procedure and returns its result
/// ready to be stored in the owned cell.
pub(crate) type Body = Box<dyn FnMut() -> StoredValue>;

/// The flavour of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationKind {
    /// A derived value. Its cell holds the procedure's result.
    Pure,

    /// An effect. Its cell holds an optional cleanup callback that runs
    /// before every re-run and on disposal.
    Effect,

    /// A top-level mount point that can be suspended and resumed.
    Root,
}

/// A read-only snapshot of a computation's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputationInfo {
    pub kind: ComputationKind,
    pub rank: u32,
    pub dirty: bool,
    pub run_count: u64,
    pub dependencies: usize,
    pub children: usize,
}

/// A versioned value-or-error slot.
pub(crate) struct CellNode {
    /// `None` until the owning computation has run for the first time.
    pub value: Option<StoredValue>,
    pub same: SameFn,
    /// Single-shot subscriptions, cleared on every effective write.
    pub subscribers: IndexSet<ComputationId>,
    /// The computation that already read this cell during the in-progress run.
    pub current_reader: Option<ComputationId>,
    /// The computation producing this cell's value. `None` for root cells.
    pub owner: Option<ComputationId>,
    pub generation: u32,
    pub disposed: bool,
}

impl CellNode {
    pub fn new(value: Option<StoredValue>, same: SameFn, owner: Option<ComputationId>) -> Self {
        Self {
            value,
            same,
            subscribers: IndexSet::new(),
            current_reader: None,
            owner,
            generation: 0,
            disposed: false,
        }
    }

    /// Whether this slot still holds the live cell `id` refers to.
    pub fn is_live(&self, id: CellId) -> bool {
        !self.disposed && self.generation == id.generation
    }
}

/// A re-runnable procedure and its bookkeeping.
pub(crate) struct ComputationNode {
    pub kind: ComputationKind,
    /// Taken out of the slot while the body executes.
    pub body: Option<Body>,
    pub owned_cell: CellId,
    /// Cells read during the last completed run.
    pub dependencies: IndexSet<CellId>,
    /// Cells created during the last run, in creation order.
    pub children: SmallVec<[CellId; 4]>,
    pub dirty: bool,
    pub running: bool,
    /// Topological depth, strictly above every computation this one reads from.
    pub rank: u32,
    pub run_count: u64,
    pub generation: u32,
    pub disposed: bool,
}

impl ComputationNode {
    pub fn new(kind: ComputationKind, body: Body, owned_cell: CellId) -> Self {
        Self {
            kind,
            body: Some(body),
            owned_cell,
            dependencies: IndexSet::new(),
            children: SmallVec::new(),
            // Start dirty to ensure first computation
            dirty: true,
            running: false,
            rank: 0,
            run_count: 0,
            generation: 0,
            disposed: false,
        }
    }

    /// Whether this slot still holds the live computation `id` refers to.
    pub fn is_live(&self, id: ComputationId) -> bool {
        !self.disposed && self.generation == id.generation
    }

    pub fn info(&self) -> ComputationInfo {
        ComputationInfo {
            kind: self.kind,
            rank: self.rank,
            dirty: self.dirty,
            run_count: self.run_count,
            dependencies: self.dependencies.len(),
            children: self.children.len(),
        }
    }
}
