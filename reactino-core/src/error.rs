//! Error types for the reactive engine.
//!
//! Structural errors (reading outside a computation, writing from a foreign
//! computation, touching disposed nodes) are contract violations and are
//! returned straight to the caller. Application errors are data: they are
//! stored in the failing computation's cell and re-raised to every reader.

use std::fmt;
use std::rc::Rc;

use crate::graph::{CellId, ComputationId};

/// A reference to a node in the reactive graph, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Cell(CellId),
    Computation(ComputationId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Cell(id) => write!(f, "cell #{}", id.raw()),
            NodeRef::Computation(id) => write!(f, "computation #{}", id.raw()),
        }
    }
}

/// Errors produced by the reactive engine.
///
/// The type is `Clone` because a failed computation's error is stored in its
/// cell and handed out again on every read.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactiveError {
    /// A cell was read with no computation executing.
    #[error("a cell can only be read inside a running computation")]
    ReadOutsideComputation,

    /// A cell was written from a computation that does not own it.
    #[error("a cell can only be written by its owning computation or from outside any computation")]
    WriteFromForeignComputation,

    /// The cell or computation has been disposed.
    #[error("{0} is already disposed")]
    AlreadyDisposed(NodeRef),

    /// A computation's cell was read while that computation was executing.
    #[error("dependency cycle through computation #{}", .0.raw())]
    Cycle(ComputationId),

    /// A derived cell has no value yet.
    #[error("cell #{} has not been computed", .0.raw())]
    NotComputed(CellId),

    /// `Runtime::settle` was called from inside a running computation.
    #[error("the scheduler cannot be drained from inside a running computation")]
    SettleInsideComputation,

    /// A single `Runtime::settle` call ran more microtasks than allowed.
    #[error("scheduler did not settle within {limit} microtasks")]
    SettleLimitExceeded { limit: usize },

    /// An error raised by application code inside a computation.
    #[error("{0}")]
    Application(Rc<dyn std::error::Error>),
}

/// A plain-text application error.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Message(pub String);

impl ReactiveError {
    /// Wrap an arbitrary error raised by application code.
    pub fn app<E>(error: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        ReactiveError::Application(Rc::new(error))
    }

    /// Create an application error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::app(Message(message.into()))
    }

    /// Whether this is an application error rather than a structural one.
    pub fn is_application(&self) -> bool {
        matches!(self, ReactiveError::Application(_))
    }

    /// Identity comparison used to suppress redundant writes.
    ///
    /// Application errors are equal only when they are the same allocation.
    pub fn same(&self, other: &ReactiveError) -> bool {
        use ReactiveError::*;
        match (self, other) {
            (ReadOutsideComputation, ReadOutsideComputation)
            | (WriteFromForeignComputation, WriteFromForeignComputation)
            | (SettleInsideComputation, SettleInsideComputation) => true,
            (AlreadyDisposed(a), AlreadyDisposed(b)) => a == b,
            (Cycle(a), Cycle(b)) => a == b,
            (NotComputed(a), NotComputed(b)) => a == b,
            (SettleLimitExceeded { limit: a }, SettleLimitExceeded { limit: b }) => a == b,
            (Application(a), Application(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Errors raised while loading a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid runtime configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("settle_limit must be at least 1")]
    ZeroSettleLimit,
}
