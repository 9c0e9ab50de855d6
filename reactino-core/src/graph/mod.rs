//! Dependency Graph
//!
//! This module holds the storage and scheduling structures of the reactive
//! engine.
//!
//! # Overview
//!
//! - Cells are value-or-error slots. A cell is either a root cell, written
//!   from outside any computation, or the owned cell of a computation.
//! - Computations read cells. Each read records an edge in both directions:
//!   the cell's subscriber set and the computation's dependency set.
//! - Computations created while another computation runs are its children;
//!   re-running or disposing the parent disposes them.
//!
//! # Design Decisions
//!
//! 1. Nodes live in arenas keyed by stable indices. Edges are index
//!    references, never owning pointers, so cyclic-looking owner/subscriber
//!    relationships need no reference counting.
//!
//! 2. Subscriptions are single-shot: a write clears the subscriber set, and
//!    a computation re-subscribes by reading again on its next run. Branches
//!    that are no longer taken drop out on their own.
//!
//! 3. Batches are ordered by rank, a topological depth maintained while
//!    reading, instead of a full topological sort per change.

mod arena;
mod node;
mod scheduler;

pub(crate) use arena::Graph;
pub(crate) use node::{Body, CellNode, SameFn, StoredValue};
pub use node::{CellId, ComputationId, ComputationInfo, ComputationKind};
pub(crate) use scheduler::{DirtyQueue, Microtask, Microtasks};
