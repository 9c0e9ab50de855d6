//! Graph Arena
//!
//! All cells and computations live in two vectors indexed by their ids.
//! Relationships between them are plain index references, so disposal is an
//! explicit edge removal.
//!
//! Disposed slots go onto a free list and are handed to the next node of the
//! same kind with a bumped generation. An id carries the generation it was
//! issued with, so a stale handle keeps reporting `AlreadyDisposed` even
//! after its slot has been reused.

use crate::error::{NodeRef, ReactiveError};

use super::node::{Body, CellId, CellNode, ComputationId, ComputationKind, ComputationNode, SameFn};

#[derive(Default)]
pub(crate) struct Graph {
    pub cells: Vec<CellNode>,
    pub computations: Vec<ComputationNode>,
    free_cells: Vec<u32>,
    free_computations: Vec<u32>,
    total_runs: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell to the arena, reusing a free slot if there is one.
    pub fn insert_cell(&mut self, mut node: CellNode) -> CellId {
        match self.free_cells.pop() {
            Some(index) => {
                let slot = &mut self.cells[index as usize];
                node.generation = slot.generation.wrapping_add(1);
                let id = CellId::new(index, node.generation);
                *slot = node;
                id
            }
            None => {
                let id = CellId::new(self.cells.len() as u32, 0);
                node.generation = 0;
                self.cells.push(node);
                id
            }
        }
    }

    /// Add a computation together with the cell it owns.
    pub fn insert_computation(
        &mut self,
        kind: ComputationKind,
        body: Body,
        same: SameFn,
    ) -> (ComputationId, CellId) {
        let (index, generation) = match self.free_computations.pop() {
            Some(index) => {
                let generation = self.computations[index as usize].generation.wrapping_add(1);
                (index, generation)
            }
            None => (self.computations.len() as u32, 0),
        };
        let computation = ComputationId::new(index, generation);
        let cell = self.insert_cell(CellNode::new(None, same, Some(computation)));

        let mut node = ComputationNode::new(kind, body, cell);
        node.generation = generation;
        match self.computations.get_mut(index as usize) {
            Some(slot) => *slot = node,
            None => self.computations.push(node),
        }
        (computation, cell)
    }

    /// Get a live cell.
    pub fn cell(&self, id: CellId) -> Result<&CellNode, ReactiveError> {
        match self.cells.get(id.index()) {
            Some(node) if node.is_live(id) => Ok(node),
            _ => Err(ReactiveError::AlreadyDisposed(NodeRef::Cell(id))),
        }
    }

    /// Get a live cell mutably.
    pub fn cell_mut(&mut self, id: CellId) -> Result<&mut CellNode, ReactiveError> {
        match self.cells.get_mut(id.index()) {
            Some(node) if node.is_live(id) => Ok(node),
            _ => Err(ReactiveError::AlreadyDisposed(NodeRef::Cell(id))),
        }
    }

    /// Get a live computation.
    pub fn computation(&self, id: ComputationId) -> Result<&ComputationNode, ReactiveError> {
        match self.computations.get(id.index()) {
            Some(node) if node.is_live(id) => Ok(node),
            _ => Err(ReactiveError::AlreadyDisposed(NodeRef::Computation(id))),
        }
    }

    /// Get a live computation mutably.
    pub fn computation_mut(
        &mut self,
        id: ComputationId,
    ) -> Result<&mut ComputationNode, ReactiveError> {
        match self.computations.get_mut(id.index()) {
            Some(node) if node.is_live(id) => Ok(node),
            _ => Err(ReactiveError::AlreadyDisposed(NodeRef::Computation(id))),
        }
    }

    pub fn is_cell_disposed(&self, id: CellId) -> bool {
        self.cell(id).is_err()
    }

    pub fn is_computation_disposed(&self, id: ComputationId) -> bool {
        self.computation(id).is_err()
    }

    /// Put a disposed cell's slot up for reuse.
    pub fn recycle_cell(&mut self, id: CellId) {
        if let Some(node) = self.cells.get(id.index()) {
            if node.disposed && node.generation == id.generation() {
                self.free_cells.push(id.raw());
            }
        }
    }

    /// Put a disposed computation's slot up for reuse.
    pub fn recycle_computation(&mut self, id: ComputationId) {
        if let Some(node) = self.computations.get(id.index()) {
            if node.disposed && node.generation == id.generation() {
                self.free_computations.push(id.raw());
            }
        }
    }

    /// Rank of a computation; disposed computations rank 0.
    pub fn rank(&self, id: ComputationId) -> u32 {
        self.computation(id).map_or(0, |node| node.rank)
    }

    /// Record that `computation` read `cell`, both ways.
    pub fn add_edge(&mut self, cell: CellId, computation: ComputationId) {
        if self.is_computation_disposed(computation) {
            return;
        }
        let Ok(node) = self.cell_mut(cell) else {
            return;
        };
        node.subscribers.insert(computation);
        if let Ok(node) = self.computation_mut(computation) {
            node.dependencies.insert(cell);
        }
    }

    /// Remove a dependency edge in both directions.
    pub fn remove_edge(&mut self, cell: CellId, computation: ComputationId) {
        if let Ok(node) = self.cell_mut(cell) {
            node.subscribers.shift_remove(&computation);
        }
        if let Some(node) = self.computations.get_mut(computation.index()) {
            if node.generation == computation.generation() {
                node.dependencies.shift_remove(&cell);
            }
        }
    }

    pub fn record_run(&mut self) {
        self.total_runs += 1;
    }

    pub fn live_cells(&self) -> usize {
        self.cells.len() - self.free_cells.len()
    }

    pub fn live_computations(&self) -> usize {
        self.computations.len() - self.free_computations.len()
    }

    /// Ids of every live computation, in slot order.
    pub fn live_computation_ids(&self) -> Vec<ComputationId> {
        self.computations
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.disposed)
            .map(|(index, node)| ComputationId::new(index as u32, node.generation))
            .collect()
    }

    /// Ids of every live cell, in slot order.
    pub fn live_cell_ids(&self) -> Vec<CellId> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.disposed)
            .map(|(index, node)| CellId::new(index as u32, node.generation))
            .collect()
    }

    /// Completed runs since the graph was created, disposed computations included.
    pub fn total_runs(&self) -> u64 {
        self.total_runs
    }
}
