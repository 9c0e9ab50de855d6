//! Reactive Primitives
//!
//! This module implements the user-facing reactive system: cells, pure
//! computations and effects, all living in a [`Runtime`].
//!
//! # Concepts
//!
//! ## Cells
//!
//! A cell is a container for a value or an error. When a cell is read inside
//! a running computation, that computation subscribes to it. When the cell is
//! written with a different value, every subscriber is marked dirty and
//! queued for the next flush.
//!
//! ## Computations
//!
//! A computation is a memoized derived value. It runs lazily on first read,
//! caches its result in its own cell, and re-runs only when something it read
//! during its last run changes.
//!
//! ## Effects
//!
//! An effect is a side-effecting computation that runs on creation and then
//! whenever its dependencies change. It may return a cleanup callback. Root
//! effects can additionally be suspended and resumed.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically: the runtime keeps a stack of the
//! computations currently executing, and every tracked read records an edge
//! from the cell to the computation on top of that stack.
//!
//! Writes never run anything synchronously. They queue dirty computations and
//! schedule a flush on the runtime's microtask queue, drained by
//! [`Runtime::settle`] or [`Runtime::drive`]. Reads in between pull fresh
//! values on demand, so nobody observes a stale derived value.

mod context;
mod effect;
mod memo;
mod runtime;
mod signal;

pub use effect::{create_effect, create_root_effect, Cleanup, Effect, RootEffect};
pub use memo::{create_computation, Computed};
pub use runtime::Runtime;
pub use signal::{create_cell, CellReader, CellWriter};

pub use crate::error::ReactiveError;
pub use crate::graph::{CellId, ComputationId, ComputationInfo, ComputationKind};
