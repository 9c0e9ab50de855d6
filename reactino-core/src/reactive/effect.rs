//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs immediately to establish its initial
//!    dependencies.
//!
//! 2. When any dependency changes, the effect is queued and re-runs in the
//!    next flush, after every computation of lower rank.
//!
//! 3. The procedure may return a cleanup callback. It runs before the next
//!    re-run and when the effect is disposed, ahead of the disposal of
//!    anything the effect created during its run.
//!
//! # Root Effects
//!
//! A root effect is the mount point used by a rendering layer. Besides
//! running like an effect it can be suspended: when nothing subscribes to it
//! any more it detaches from everything it reads, cascading upstream through
//! computations left without subscribers. Resuming re-runs it and re-attaches.
//!
//! # Differences from Computed
//!
//! - Computed values are lazy; effects run on creation.
//! - An effect's cell holds its cleanup callback rather than a value. Only
//!   its error state counts as a change to whoever resumed it.

use std::any::Any;
use std::fmt;

use tracing::warn;

use crate::error::ReactiveError;
use crate::graph::{Body, CellId, ComputationId, ComputationKind, StoredValue};

use super::runtime::Runtime;
use super::signal::same_result;

/// Callback returned by an effect, run before its next run and on disposal.
pub type Cleanup = Box<dyn FnOnce()>;

/// What an effect's owned cell stores.
pub(crate) type EffectValue = Result<Option<Cleanup>, ReactiveError>;

/// Effects compare by error state only; a fresh cleanup is not a change.
fn same_effect_state(old: &dyn Any, new: &dyn Any) -> bool {
    match (
        old.downcast_ref::<EffectValue>(),
        new.downcast_ref::<EffectValue>(),
    ) {
        (Some(Ok(_)), Some(Ok(_))) => true,
        (Some(Err(old)), Some(Err(new))) => old.same(new),
        _ => false,
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use reactino_core::reactive::Runtime;
///
/// let runtime = Runtime::new();
/// let (count, set_count) = runtime.create_cell(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let sink = seen.clone();
/// let _effect = runtime.create_effect(move || {
///     sink.set(count.get()?);
///     Ok(None)
/// });
/// assert_eq!(seen.get(), 0);
///
/// set_count.set(5).unwrap();
/// runtime.settle().unwrap();
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    runtime: Runtime,
    computation: ComputationId,
    cell: CellId,
}

/// A suspendable top-level effect.
#[derive(Clone)]
pub struct RootEffect {
    runtime: Runtime,
    computation: ComputationId,
    cell: CellId,
}

impl Runtime {
    /// Create an effect and run it once.
    ///
    /// Inside a running computation the new effect is a child of that
    /// computation, which also subscribes to the effect's error state.
    pub fn create_effect<F>(&self, mut effect: F) -> Effect
    where
        F: FnMut() -> Result<Option<Cleanup>, ReactiveError> + 'static,
    {
        let body: Body = Box::new(move || Box::new(effect()) as StoredValue);
        let (computation, cell) =
            self.insert_computation(ComputationKind::Effect, body, same_effect_state);

        if let Err(error) = self.resume::<Option<Cleanup>>(cell) {
            warn!(?computation, %error, "effect failed on its first run");
        }

        Effect {
            runtime: self.clone(),
            computation,
            cell,
        }
    }

    /// Create a root effect and run it once.
    pub fn create_root_effect<F>(&self, mut effect: F) -> RootEffect
    where
        F: FnMut() -> Result<(), ReactiveError> + 'static,
    {
        let body: Body = Box::new(move || Box::new(effect()) as StoredValue);
        let (computation, cell) =
            self.insert_computation(ComputationKind::Root, body, same_result::<()>);

        if let Err(error) = self.resume::<()>(cell) {
            warn!(?computation, %error, "root effect failed on its first run");
        }

        RootEffect {
            runtime: self.clone(),
            computation,
            cell,
        }
    }
}

/// Create an effect on this thread's default runtime.
pub fn create_effect<F>(effect: F) -> Effect
where
    F: FnMut() -> Result<Option<Cleanup>, ReactiveError> + 'static,
{
    Runtime::current().create_effect(effect)
}

/// Create a root effect on this thread's default runtime.
pub fn create_root_effect<F>(effect: F) -> RootEffect
where
    F: FnMut() -> Result<(), ReactiveError> + 'static,
{
    Runtime::current().create_root_effect(effect)
}

impl Effect {
    pub fn id(&self) -> ComputationId {
        self.computation
    }

    /// The error raised by the last run, if it failed.
    pub fn error(&self) -> Option<ReactiveError> {
        self.runtime.check::<Option<Cleanup>>(self.cell).err()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> Result<u64, ReactiveError> {
        Ok(self.runtime.computation_info(self.computation)?.run_count)
    }

    pub fn is_disposed(&self) -> bool {
        self.runtime.is_computation_disposed(self.computation)
    }

    /// Dispose of the effect.
    ///
    /// Runs the pending cleanup, disposes everything the effect created and
    /// unsubscribes it. After disposal the effect never runs again.
    pub fn dispose(&self) {
        self.runtime.dispose_computation(self.computation);
    }
}

impl RootEffect {
    pub fn id(&self) -> ComputationId {
        self.computation
    }

    /// Re-run the effect if it is dirty (always the case after a suspend)
    /// and report the error of its latest run.
    ///
    /// Called inside a running computation, that computation subscribes to
    /// this effect, which then cannot be suspended until it unsubscribes.
    pub fn resume(&self) -> Result<(), ReactiveError> {
        self.runtime.resume::<()>(self.cell)
    }

    /// Detach the effect from the graph if nothing subscribes to it.
    ///
    /// Returns whether the effect was suspended.
    pub fn suspend(&self) -> bool {
        self.runtime.suspend(self.cell)
    }

    /// Whether the effect will re-run on its next resume or flush.
    pub fn is_dirty(&self) -> Result<bool, ReactiveError> {
        Ok(self.runtime.computation_info(self.computation)?.dirty)
    }

    pub fn run_count(&self) -> Result<u64, ReactiveError> {
        Ok(self.runtime.computation_info(self.computation)?.run_count)
    }

    pub fn is_disposed(&self) -> bool {
        self.runtime.is_computation_disposed(self.computation)
    }

    pub fn dispose(&self) {
        self.runtime.dispose_computation(self.computation);
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.computation)
            .field("run_count", &self.run_count().ok())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl fmt::Debug for RootEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootEffect")
            .field("id", &self.computation)
            .field("run_count", &self.run_count().ok())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
