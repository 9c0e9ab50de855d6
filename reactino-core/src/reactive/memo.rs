//! Pure Computations
//!
//! A pure computation is a memoized derived value. It owns one cell holding
//! the result of its procedure and re-runs only when a cell it read during
//! its last run changes.
//!
//! # How Computations Work
//!
//! 1. The procedure does not run at creation. The first read (tracked or
//!    `peek`) runs it and caches the result in the owned cell.
//!
//! 2. Reading a clean computation returns the cached value.
//!
//! 3. A write to a dependency marks the computation dirty and queues it. The
//!    next flush re-runs it in rank order; a read before that brings it up
//!    to date on the spot.
//!
//! 4. If the procedure returns an error, the error is stored in the cell and
//!    re-raised to every reader. Readers that propagate it with `?` fail in
//!    turn.

use std::fmt::{self, Debug};
use std::marker::PhantomData;

use crate::error::ReactiveError;
use crate::graph::{Body, CellId, ComputationId, ComputationKind, StoredValue};

use super::runtime::Runtime;
use super::signal::same_result;

/// Reader of a pure computation's value.
///
/// # Example
///
/// ```rust
/// use reactino_core::reactive::{Runtime, ReactiveError};
///
/// let runtime = Runtime::new();
/// let (price, _) = runtime.create_cell(40);
/// let with_tax = runtime.create_computation(move || Ok::<_, ReactiveError>(price.get()? + 2));
/// assert_eq!(with_tax.peek().unwrap(), 42);
/// ```
pub struct Computed<T> {
    runtime: Runtime,
    computation: ComputationId,
    cell: CellId,
    _marker: PhantomData<fn() -> T>,
}

impl Runtime {
    /// Create a memoized derived value. The procedure runs lazily on first read.
    pub fn create_computation<T, F>(&self, mut compute: F) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        F: FnMut() -> Result<T, ReactiveError> + 'static,
    {
        let body: Body = Box::new(move || Box::new(compute()) as StoredValue);
        let (computation, cell) =
            self.insert_computation(ComputationKind::Pure, body, same_result::<T>);
        Computed {
            runtime: self.clone(),
            computation,
            cell,
            _marker: PhantomData,
        }
    }
}

/// Create a pure computation on this thread's default runtime.
pub fn create_computation<T, F>(compute: F) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: FnMut() -> Result<T, ReactiveError> + 'static,
{
    Runtime::current().create_computation(compute)
}

impl<T> Computed<T>
where
    T: Clone + 'static,
{
    /// Get the value, recomputing first if necessary, and subscribe the
    /// running computation.
    pub fn get(&self) -> Result<T, ReactiveError> {
        self.runtime.read(self.cell)
    }

    /// Get the value, recomputing first if necessary, without subscribing.
    pub fn peek(&self) -> Result<T, ReactiveError> {
        self.runtime.peek(self.cell)
    }
}

impl<T> Computed<T> {
    pub fn id(&self) -> ComputationId {
        self.computation
    }

    /// The cell holding this computation's result.
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// Whether the computation needs to re-run before its value is current.
    pub fn is_dirty(&self) -> Result<bool, ReactiveError> {
        Ok(self.runtime.computation_info(self.computation)?.dirty)
    }

    /// Topological depth used to order batches.
    pub fn rank(&self) -> Result<u32, ReactiveError> {
        Ok(self.runtime.computation_info(self.computation)?.rank)
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> Result<u64, ReactiveError> {
        Ok(self.runtime.computation_info(self.computation)?.run_count)
    }

    pub fn subscriber_count(&self) -> Result<usize, ReactiveError> {
        self.runtime.subscriber_count(self.cell)
    }

    pub fn is_disposed(&self) -> bool {
        self.runtime.is_computation_disposed(self.computation)
    }

    /// Dispose the computation, its children and its cell.
    pub fn dispose(&self) {
        self.runtime.dispose_computation(self.computation);
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            computation: self.computation,
            cell: self.cell,
            _marker: PhantomData,
        }
    }
}

impl<T> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.computation)
            .field("info", &self.runtime.computation_info(self.computation).ok())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
