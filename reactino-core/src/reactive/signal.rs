//! Cell Handles
//!
//! A cell is the fundamental reactive primitive: a value-or-error slot that
//! tracks which computations read it.
//!
//! # How Cells Work
//!
//! 1. Reading a cell inside a computation subscribes that computation.
//!
//! 2. Writing a different value marks every subscriber dirty, schedules a
//!    flush, and clears the subscriber set. Subscriptions are single-shot;
//!    a computation re-subscribes by reading again on its next run.
//!
//! 3. Writing an identical value (by `PartialEq`, or the same error) is a
//!    no-op and propagates nothing.
//!
//! Root cells are written from outside any computation. A computation may
//! only write the cell it owns, which the runtime does with its result.

use std::any::Any;
use std::fmt::{self, Debug};
use std::marker::PhantomData;

use crate::error::ReactiveError;
use crate::graph::{CellId, StoredValue};

use super::runtime::Runtime;

/// Write-suppression comparison for cells holding `Result<T, ReactiveError>`.
pub(crate) fn same_result<T: PartialEq + 'static>(old: &dyn Any, new: &dyn Any) -> bool {
    match (
        old.downcast_ref::<Result<T, ReactiveError>>(),
        new.downcast_ref::<Result<T, ReactiveError>>(),
    ) {
        (Some(Ok(old)), Some(Ok(new))) => old == new,
        (Some(Err(old)), Some(Err(new))) => old.same(new),
        _ => false,
    }
}

/// The reading half of a cell.
///
/// # Example
///
/// ```rust
/// use reactino_core::reactive::{Runtime, ReactiveError};
///
/// let runtime = Runtime::new();
/// let (count, set_count) = runtime.create_cell(0);
///
/// let reader = count.clone();
/// let doubled = runtime.create_computation(move || Ok::<_, ReactiveError>(reader.get()? * 2));
/// assert_eq!(doubled.peek().unwrap(), 0);
///
/// set_count.set(5).unwrap();
/// runtime.settle().unwrap();
/// assert_eq!(doubled.peek().unwrap(), 10);
/// ```
pub struct CellReader<T> {
    runtime: Runtime,
    id: CellId,
    _marker: PhantomData<fn() -> T>,
}

/// The writing half of a cell.
pub struct CellWriter<T> {
    runtime: Runtime,
    id: CellId,
    _marker: PhantomData<fn(T)>,
}

impl Runtime {
    /// Create a cell holding `initial`.
    ///
    /// When called while a computation runs, the cell becomes a child of
    /// that computation and is disposed when it re-runs.
    pub fn create_cell<T>(&self, initial: T) -> (CellReader<T>, CellWriter<T>)
    where
        T: Clone + PartialEq + 'static,
    {
        let value: StoredValue = Box::new(Ok::<T, ReactiveError>(initial));
        let id = self.insert_cell(value, same_result::<T>);
        let reader = CellReader {
            runtime: self.clone(),
            id,
            _marker: PhantomData,
        };
        let writer = CellWriter {
            runtime: self.clone(),
            id,
            _marker: PhantomData,
        };
        (reader, writer)
    }
}

/// Create a cell on this thread's default runtime.
pub fn create_cell<T>(initial: T) -> (CellReader<T>, CellWriter<T>)
where
    T: Clone + PartialEq + 'static,
{
    Runtime::current().create_cell(initial)
}

impl<T> CellReader<T>
where
    T: Clone + 'static,
{
    /// Get the current value and subscribe the running computation.
    ///
    /// Fails with `ReadOutsideComputation` when no computation is running,
    /// and re-raises the stored error if the cell holds one.
    pub fn get(&self) -> Result<T, ReactiveError> {
        self.runtime.read(self.id)
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> Result<T, ReactiveError> {
        self.runtime.peek(self.id)
    }
}

impl<T> CellReader<T> {
    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> Result<usize, ReactiveError> {
        self.runtime.subscriber_count(self.id)
    }

    pub fn is_disposed(&self) -> bool {
        self.runtime.is_cell_disposed(self.id)
    }

    /// Dispose the cell. Any later read or write fails.
    pub fn dispose(&self) {
        self.runtime.dispose_cell(self.id);
    }
}

impl<T> CellWriter<T>
where
    T: PartialEq + 'static,
{
    /// Set a new value and notify subscribers.
    ///
    /// Returns `false` if the value equals the current one and nothing was
    /// propagated.
    pub fn set(&self, value: T) -> Result<bool, ReactiveError> {
        self.runtime
            .write(self.id, Box::new(Ok::<T, ReactiveError>(value)))
    }

    /// Put the cell into an error state. Readers get `error` back.
    pub fn fail(&self, error: ReactiveError) -> Result<bool, ReactiveError> {
        self.runtime
            .write(self.id, Box::new(Err::<T, ReactiveError>(error)))
    }

    /// Update the value using a function of the current one.
    ///
    /// Fails with the stored error if the cell is in an error state.
    pub fn update<F>(&self, f: F) -> Result<bool, ReactiveError>
    where
        T: Clone,
        F: FnOnce(&T) -> T,
    {
        let current = self.runtime.peek::<T>(self.id)?;
        self.set(f(&current))
    }
}

impl<T> CellWriter<T> {
    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn dispose(&self) {
        self.runtime.dispose_cell(self.id);
    }
}

impl<T> Clone for CellReader<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for CellWriter<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T> Debug for CellReader<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellReader")
            .field("id", &self.id)
            .field("value", &self.runtime.peek::<T>(self.id))
            .finish()
    }
}

impl<T> Debug for CellWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellWriter").field("id", &self.id).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
