//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, computations
//! and effects. It owns the graph arena, the dirty queue, the microtask queue
//! and the context stack.
//!
//! # How It Works
//!
//! 1. Reading a cell inside a computation first brings the cell's owner up
//!    to date (a lazy pull through the whole upstream chain), then records
//!    the dependency edge and raises the reader's rank above the owner's.
//!
//! 2. Writing a cell marks its subscribers dirty, pushes them onto the dirty
//!    queue and clears the subscriber set. The first push schedules a flush.
//!
//! 3. A flush drains the dirty queue in rank order. Runs that dirty further
//!    computations abort the pass and schedule a fresh one.
//!
//! # Threading
//!
//! A runtime is single-threaded. Handles hold an `Rc` to it and are `!Send`.
//! `Runtime::current()` gives each thread a lazily created default runtime;
//! `Runtime::new()` builds an isolated one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::config::{RuntimeConfig, RuntimeStats};
use crate::error::{NodeRef, ReactiveError};
use crate::graph::{
    Body, CellId, CellNode, ComputationId, ComputationInfo, ComputationKind, DirtyQueue, Graph,
    Microtask, Microtasks, SameFn, StoredValue,
};

use super::context::{Backup, ContextStack, ReactiveContext};
use super::effect::EffectValue;

struct Inner {
    graph: RefCell<Graph>,
    queue: RefCell<DirtyQueue>,
    microtasks: RefCell<Microtasks>,
    context: RefCell<ContextStack>,
    config: RuntimeConfig,
    wakeup: Notify,
    shut_down: Cell<bool>,
}

/// Handle to a reactive runtime. Cloning shares the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<Inner>,
}

thread_local! {
    static CURRENT: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create an isolated runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create an isolated runtime.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                graph: RefCell::new(Graph::new()),
                queue: RefCell::new(DirtyQueue::new()),
                microtasks: RefCell::new(Microtasks::new()),
                context: RefCell::new(ContextStack::new()),
                config,
                wakeup: Notify::new(),
                shut_down: Cell::new(false),
            }),
        }
    }

    /// The default runtime of this thread, created on first use.
    pub fn current() -> Runtime {
        CURRENT.with(|slot| slot.borrow_mut().get_or_insert_with(Runtime::new).clone())
    }

    /// Install `runtime` as this thread's default, returning the previous one.
    pub fn set_current(runtime: Runtime) -> Option<Runtime> {
        CURRENT.with(|slot| slot.borrow_mut().replace(runtime))
    }

    /// Shut down and forget this thread's default runtime.
    ///
    /// The next call to [`Runtime::current`] creates a fresh one.
    pub fn reset_current() {
        let previous = CURRENT.with(|slot| slot.borrow_mut().take());
        if let Some(runtime) = previous {
            runtime.shutdown();
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether two handles point at the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The computation currently executing, if any.
    pub fn current_computation(&self) -> Option<ComputationId> {
        self.inner.context.borrow().current()
    }

    /// Check if we're inside a running computation.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.borrow().is_active()
    }

    pub fn stats(&self) -> RuntimeStats {
        let graph = self.inner.graph.borrow();
        RuntimeStats {
            live_cells: graph.live_cells(),
            live_computations: graph.live_computations(),
            dirty_queue_len: self.inner.queue.borrow().len(),
            pending_microtasks: self.inner.microtasks.borrow().len(),
            total_runs: graph.total_runs(),
        }
    }

    /// Run pending microtasks until none remain.
    ///
    /// Returns the number of microtasks executed. All writes issued since
    /// the previous call are coalesced into the batches drained here.
    pub fn settle(&self) -> Result<usize, ReactiveError> {
        if self.is_tracking() {
            return Err(ReactiveError::SettleInsideComputation);
        }

        let limit = self.inner.config.settle_limit;
        let mut executed = 0;
        loop {
            if self.inner.microtasks.borrow().is_empty() {
                break;
            }
            if executed >= limit {
                warn!(limit, "scheduler did not settle");
                return Err(ReactiveError::SettleLimitExceeded { limit });
            }

            let task = self.inner.microtasks.borrow_mut().next();
            let Some(task) = task else { break };
            executed += 1;

            match task {
                Microtask::Flush { expected } => self.flush(expected),
            }
        }
        Ok(executed)
    }

    /// Settle every time a flush is scheduled, until [`Runtime::shutdown`].
    ///
    /// Meant to be spawned on a tokio `LocalSet` next to the tasks that
    /// write into the graph. Hitting the settle limit does not stop the
    /// driver: it yields to the other tasks and picks up the remaining
    /// microtasks with a fresh budget.
    pub async fn drive(&self) -> Result<(), ReactiveError> {
        loop {
            match self.settle() {
                Ok(_) => {}
                Err(ReactiveError::SettleLimitExceeded { limit }) => {
                    debug!(limit, "driver yielding before the next settle");
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(error) => return Err(error),
            }
            if self.inner.shut_down.get() {
                return Ok(());
            }
            self.inner.wakeup.notified().await;
        }
    }

    /// Dispose every live computation and cell and drop pending work.
    ///
    /// Computations go first, in slot order; each takes its children and
    /// their effect cleanups with it.
    pub fn shutdown(&self) {
        let (computations, cells) = {
            let graph = self.inner.graph.borrow();
            (graph.live_computation_ids(), graph.live_cell_ids())
        };
        debug!(
            computations = computations.len(),
            cells = cells.len(),
            "shutting down runtime"
        );

        for id in computations {
            self.dispose_computation(id);
        }
        for cell in cells {
            self.dispose_cell(cell);
        }

        self.inner.queue.borrow_mut().clear();
        self.inner.microtasks.borrow_mut().clear();
        self.inner.shut_down.set(true);
        self.inner.wakeup.notify_one();
    }

    // ------------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------------

    /// Register a root cell (or a child cell of the running computation).
    pub(crate) fn insert_cell(&self, value: StoredValue, same: SameFn) -> CellId {
        let parent = self.current_computation();
        let mut graph = self.inner.graph.borrow_mut();
        let cell = graph.insert_cell(CellNode::new(Some(value), same, None));
        if let Some(parent) = parent {
            if let Ok(node) = graph.computation_mut(parent) {
                node.children.push(cell);
            }
        }
        trace!(?cell, ?parent, "cell created");
        cell
    }

    /// Register a computation and its owned cell.
    pub(crate) fn insert_computation(
        &self,
        kind: ComputationKind,
        body: Body,
        same: SameFn,
    ) -> (ComputationId, CellId) {
        let parent = self.current_computation();
        let mut graph = self.inner.graph.borrow_mut();
        let (computation, cell) = graph.insert_computation(kind, body, same);
        if let Some(parent) = parent {
            if let Ok(node) = graph.computation_mut(parent) {
                node.children.push(cell);
            }
        }
        trace!(?computation, ?kind, ?parent, "computation created");
        (computation, cell)
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    /// Tracked read: subscribes the running computation.
    pub(crate) fn read<T: Clone + 'static>(&self, cell: CellId) -> Result<T, ReactiveError> {
        let caller = self
            .current_computation()
            .ok_or(ReactiveError::ReadOutsideComputation)?;
        self.track(cell, caller)?;
        self.load(cell)
    }

    /// Untracked read: brings the owner up to date without subscribing.
    pub(crate) fn peek<T: Clone + 'static>(&self, cell: CellId) -> Result<T, ReactiveError> {
        self.refresh(cell)?;
        self.load(cell)
    }

    /// Bring a cell up to date, subscribing the running computation if
    /// there is one, and report its error state without cloning the value.
    pub(crate) fn resume<V: 'static>(&self, cell: CellId) -> Result<(), ReactiveError> {
        match self.current_computation() {
            Some(caller) => self.track(cell, caller)?,
            None => self.refresh(cell)?,
        }
        self.check::<V>(cell)
    }

    /// The stored error of a cell holding `Result<V, ReactiveError>`, if any.
    pub(crate) fn check<V: 'static>(&self, cell: CellId) -> Result<(), ReactiveError> {
        let graph = self.inner.graph.borrow();
        let node = graph.cell(cell)?;
        match node
            .value
            .as_deref()
            .and_then(|value| value.downcast_ref::<Result<V, ReactiveError>>())
        {
            Some(Ok(_)) => Ok(()),
            Some(Err(error)) => Err(error.clone()),
            None => Err(ReactiveError::NotComputed(cell)),
        }
    }

    fn refresh(&self, cell: CellId) -> Result<(), ReactiveError> {
        let owner = self.inner.graph.borrow().cell(cell)?.owner;
        if let Some(owner) = owner {
            self.update(owner)?;
        }
        Ok(())
    }

    fn track(&self, cell: CellId, caller: ComputationId) -> Result<(), ReactiveError> {
        let owner = self.inner.graph.borrow().cell(cell)?.owner;
        if let Some(owner) = owner {
            self.update(owner)?;
        }

        let mut graph = self.inner.graph.borrow_mut();
        graph.computation(caller)?;
        let owner_rank = owner.map(|owner| graph.rank(owner));

        let node = graph.cell_mut(cell)?;
        if node.current_reader == Some(caller) {
            return Ok(());
        }
        if let Some(previous) = node.current_reader.replace(caller) {
            self.inner.context.borrow_mut().stash_reader(cell, previous);
        }
        graph.add_edge(cell, caller);

        if let Some(owner_rank) = owner_rank {
            let reader = graph.computation_mut(caller)?;
            if reader.rank <= owner_rank {
                reader.rank = owner_rank + 1;
            }
        }
        trace!(?cell, computation = ?caller, "dependency recorded");
        Ok(())
    }

    fn load<T: Clone + 'static>(&self, cell: CellId) -> Result<T, ReactiveError> {
        let graph = self.inner.graph.borrow();
        let node = graph.cell(cell)?;
        match node
            .value
            .as_deref()
            .and_then(|value| value.downcast_ref::<Result<T, ReactiveError>>())
        {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(error)) => Err(error.clone()),
            None => Err(ReactiveError::NotComputed(cell)),
        }
    }

    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    /// Store a new value and notify subscribers. Returns `false` when the
    /// value was identical to the current one and nothing happened.
    ///
    /// Effect cells are the exception: an identical write still replaces the
    /// stored value so the fresh cleanup callback is kept.
    pub(crate) fn write(&self, cell: CellId, value: StoredValue) -> Result<bool, ReactiveError> {
        let current = self.current_computation();
        let (released, subscribers) = {
            let mut graph = self.inner.graph.borrow_mut();
            let owner = graph.cell(cell)?.owner;
            let keeps_fresh = owner
                .and_then(|owner| graph.computation(owner).ok())
                .map_or(false, |owner| owner.kind == ComputationKind::Effect);

            let node = graph.cell_mut(cell)?;
            if current.is_some() && current != node.owner {
                return Err(ReactiveError::WriteFromForeignComputation);
            }
            let unchanged = node
                .value
                .as_deref()
                .map_or(false, |old| (node.same)(old, &*value));
            if unchanged && !keeps_fresh {
                (Some(value), None)
            } else {
                let previous = node.value.replace(value);
                (previous, (!unchanged).then(|| std::mem::take(&mut node.subscribers)))
            }
        };
        // Values are dropped only once the graph is no longer borrowed.
        let Some(subscribers) = subscribers else {
            drop(released);
            return Ok(false);
        };

        trace!(?cell, subscribers = subscribers.len(), "cell written");
        self.mark_dirty(subscribers);
        drop(released);
        Ok(true)
    }

    fn mark_dirty(&self, subscribers: impl IntoIterator<Item = ComputationId>) {
        let mut scheduled = None;
        {
            let mut graph = self.inner.graph.borrow_mut();
            let mut queue = self.inner.queue.borrow_mut();
            for id in subscribers {
                let Ok(node) = graph.computation_mut(id) else {
                    continue;
                };
                if node.dirty {
                    continue;
                }
                node.dirty = true;
                if queue.push(id) {
                    scheduled = Some(queue.generation());
                }
            }
        }
        if let Some(expected) = scheduled {
            self.schedule(Microtask::Flush { expected });
        }
    }

    fn schedule(&self, task: Microtask) {
        self.inner.microtasks.borrow_mut().schedule(task);
        self.inner.wakeup.notify_one();
    }

    // ------------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------------

    /// Re-run a computation if it is dirty.
    ///
    /// Fails with `AlreadyDisposed` for disposed computations and with
    /// `Cycle` if the computation is already executing further up the stack.
    pub(crate) fn update(&self, id: ComputationId) -> Result<(), ReactiveError> {
        let (mut body, owned_cell, kind) = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.computation_mut(id)?;
            if !node.dirty {
                return Ok(());
            }
            if node.running {
                return Err(ReactiveError::Cycle(id));
            }
            let Some(body) = node.body.take() else {
                return Err(ReactiveError::AlreadyDisposed(NodeRef::Computation(id)));
            };
            node.running = true;
            (body, node.owned_cell, node.kind)
        };
        debug!(computation = ?id, ?kind, "running computation");

        let context = ReactiveContext::enter(&self.inner.context, id);
        self.dispose_children(id);
        if let Ok(node) = self.inner.graph.borrow_mut().computation_mut(id) {
            node.rank = 0;
        }

        let value = body();

        let orphaned = {
            let mut graph = self.inner.graph.borrow_mut();
            match graph.computation_mut(id) {
                Ok(node) => {
                    node.body = Some(body);
                    None
                }
                // Disposed by its own body.
                Err(_) => Some(body),
            }
        };
        drop(orphaned);

        match self.write(owned_cell, value) {
            Ok(_) | Err(ReactiveError::AlreadyDisposed(_)) => {}
            Err(error) => warn!(computation = ?id, %error, "failed to store computation result"),
        }

        {
            let mut graph = self.inner.graph.borrow_mut();
            if let Ok(node) = graph.computation_mut(id) {
                node.dirty = false;
                node.running = false;
                node.run_count += 1;
            }
            graph.record_run();
        }

        let backup = context.exit();
        self.reconcile(id, backup);
        Ok(())
    }

    /// Drop dependencies that were not read again during the last run and
    /// hand cells re-read by this run back to the reader they were taken from.
    fn reconcile(&self, id: ComputationId, backup: Option<Backup>) {
        let mut graph = self.inner.graph.borrow_mut();
        let Graph {
            cells,
            computations,
            ..
        } = &mut *graph;
        let Some(node) = computations.get_mut(id.index()).filter(|node| node.is_live(id)) else {
            return;
        };

        node.dependencies.retain(|cell| {
            let Some(cell_node) = cells.get_mut(cell.index()).filter(|node| node.is_live(*cell)) else {
                return false;
            };
            if cell_node.current_reader == Some(id) {
                cell_node.current_reader = backup.as_ref().and_then(|backup| backup.get(cell).copied());
                true
            } else {
                cell_node.subscribers.shift_remove(&id);
                trace!(?cell, computation = ?id, "stale dependency pruned");
                false
            }
        });
    }

    fn flush(&self, expected: u64) {
        {
            let mut queue = self.inner.queue.borrow_mut();
            if queue.generation() != expected {
                let generation = queue.generation();
                drop(queue);
                trace!(expected, generation, "dirty queue changed before flush; rescheduling");
                self.schedule(Microtask::Flush {
                    expected: generation,
                });
                return;
            }
            let graph = self.inner.graph.borrow();
            queue.sort_by_rank(|id| graph.rank(id));
            debug!(pending = queue.len(), "flushing dirty computations");
        }

        loop {
            let (next, generation) = {
                let mut queue = self.inner.queue.borrow_mut();
                match queue.pop_front() {
                    Some(id) => (id, queue.generation()),
                    None => break,
                }
            };

            self.run_scheduled(next);

            let current = self.inner.queue.borrow().generation();
            if current != generation {
                debug!("run dirtied further computations; rescheduling flush");
                self.schedule(Microtask::Flush { expected: current });
                return;
            }
        }
    }

    fn run_scheduled(&self, id: ComputationId) {
        if self.inner.graph.borrow().is_computation_disposed(id) {
            trace!(computation = ?id, "skipping disposed computation");
            return;
        }
        if let Err(error) = self.update(id) {
            warn!(computation = ?id, %error, "scheduled run failed");
        }
    }

    // ------------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------------

    /// Run the effect cleanup (if any) and dispose every child cell created
    /// during the previous run, in creation order.
    fn dispose_children(&self, id: ComputationId) {
        let (kind, owned_cell, children) = {
            let mut graph = self.inner.graph.borrow_mut();
            let Ok(node) = graph.computation_mut(id) else {
                return;
            };
            (node.kind, node.owned_cell, std::mem::take(&mut node.children))
        };
        self.release(kind, owned_cell, children);
    }

    fn release(
        &self,
        kind: ComputationKind,
        owned_cell: CellId,
        children: impl IntoIterator<Item = CellId>,
    ) {
        if kind == ComputationKind::Effect {
            self.run_cleanup(owned_cell);
        }
        for child in children {
            self.dispose_cell(child);
        }
    }

    fn run_cleanup(&self, cell: CellId) {
        let cleanup = {
            let mut graph = self.inner.graph.borrow_mut();
            graph
                .cell_mut(cell)
                .ok()
                .and_then(|node| node.value.as_deref_mut())
                .and_then(|value| value.downcast_mut::<EffectValue>())
                .and_then(|result| result.as_mut().ok())
                .and_then(Option::take)
        };
        if let Some(cleanup) = cleanup {
            trace!(?cell, "running effect cleanup");
            cleanup();
        }
    }

    /// Dispose a cell. Owned cells take their computation down with them.
    pub(crate) fn dispose_cell(&self, cell: CellId) {
        let owner = {
            let graph = self.inner.graph.borrow();
            let Ok(node) = graph.cell(cell) else {
                return;
            };
            node.owner
                .filter(|owner| !graph.is_computation_disposed(*owner))
        };
        match owner {
            Some(owner) => self.dispose_computation(owner),
            None => self.finalize_cell(cell),
        }
    }

    /// Dispose a computation: cleanup, children, subscriptions, owned cell.
    pub(crate) fn dispose_computation(&self, id: ComputationId) {
        let (kind, owned_cell, children, dependencies, body) = {
            let mut graph = self.inner.graph.borrow_mut();
            let Ok(node) = graph.computation_mut(id) else {
                return;
            };
            node.disposed = true;
            node.dirty = false;
            (
                node.kind,
                node.owned_cell,
                std::mem::take(&mut node.children),
                std::mem::take(&mut node.dependencies),
                node.body.take(),
            )
        };
        debug!(computation = ?id, ?kind, "disposing computation");

        self.release(kind, owned_cell, children);
        {
            let mut graph = self.inner.graph.borrow_mut();
            for cell in dependencies {
                graph.remove_edge(cell, id);
                if let Ok(node) = graph.cell_mut(cell) {
                    if node.current_reader == Some(id) {
                        node.current_reader = None;
                    }
                }
            }
        }
        self.finalize_cell(owned_cell);
        self.inner.graph.borrow_mut().recycle_computation(id);
        drop(body);
    }

    fn finalize_cell(&self, cell: CellId) {
        let value = {
            let mut graph = self.inner.graph.borrow_mut();
            let Graph {
                cells,
                computations,
                ..
            } = &mut *graph;
            let Some(node) = cells.get_mut(cell.index()).filter(|node| node.is_live(cell)) else {
                return;
            };
            node.disposed = true;
            node.current_reader = None;
            for subscriber in node.subscribers.drain(..) {
                if let Some(reader) = computations
                    .get_mut(subscriber.index())
                    .filter(|reader| reader.generation == subscriber.generation())
                {
                    reader.dependencies.shift_remove(&cell);
                }
            }
            let value = node.value.take();
            graph.recycle_cell(cell);
            value
        };
        trace!(?cell, "cell disposed");
        drop(value);
    }

    // ------------------------------------------------------------------------
    // Suspension
    // ------------------------------------------------------------------------

    /// Detach a subscriber-less computation from everything it reads,
    /// cascading upstream through cells that end up with no subscribers.
    pub(crate) fn suspend(&self, cell: CellId) -> bool {
        let (owner, dependencies) = {
            let mut graph = self.inner.graph.borrow_mut();
            let Graph {
                cells,
                computations,
                ..
            } = &mut *graph;
            let Some(node) = cells.get(cell.index()).filter(|node| node.is_live(cell)) else {
                return false;
            };
            if !node.subscribers.is_empty() {
                return false;
            }
            let Some(owner) = node.owner else {
                return false;
            };
            let Some(computation) = computations
                .get_mut(owner.index())
                .filter(|computation| computation.is_live(owner))
            else {
                return false;
            };

            computation.dirty = true;
            let dependencies = std::mem::take(&mut computation.dependencies);
            for dependency in &dependencies {
                if let Some(node) = cells
                    .get_mut(dependency.index())
                    .filter(|node| node.is_live(*dependency))
                {
                    node.subscribers.shift_remove(&owner);
                }
            }
            (owner, dependencies)
        };
        debug!(computation = ?owner, detached = dependencies.len(), "computation suspended");

        for dependency in dependencies {
            self.suspend(dependency);
        }
        true
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub(crate) fn subscriber_count(&self, cell: CellId) -> Result<usize, ReactiveError> {
        Ok(self.inner.graph.borrow().cell(cell)?.subscribers.len())
    }

    pub(crate) fn is_cell_disposed(&self, cell: CellId) -> bool {
        self.inner.graph.borrow().is_cell_disposed(cell)
    }

    pub(crate) fn is_computation_disposed(&self, id: ComputationId) -> bool {
        self.inner.graph.borrow().is_computation_disposed(id)
    }

    /// Snapshot of a live computation's bookkeeping.
    pub fn computation_info(&self, id: ComputationId) -> Result<ComputationInfo, ReactiveError> {
        Ok(self.inner.graph.borrow().computation(id)?.info())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("stats", &self.stats())
            .field("config", &self.inner.config)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
