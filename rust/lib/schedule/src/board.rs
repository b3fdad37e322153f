use std::collections::HashMap;

use tracing::{debug, warn};

use crate::model::{Board, Operation, OperationPatch, WorkCenter};

/// Canonical board plus derived lookups.
///
/// - `row_index(work_center_id)`: display row of a work center
/// - `operation(id)`: operation by id
///
/// Both indices are rebuilt together with every full swap, so a lookup never
/// sees rows from one board and operations from another.
#[derive(Debug, Clone)]
pub struct BoardModel {
    board: Board,
    rows: HashMap<String, usize>,
    ops: HashMap<String, usize>,
}

impl BoardModel {
    pub fn new(board: Board) -> Self {
        let mut model = Self {
            board: Board::new(""),
            rows: HashMap::new(),
            ops: HashMap::new(),
        };
        model.replace_full_board(board);
        model
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn into_board(self) -> Board {
        self.board
    }

    pub fn id(&self) -> &str {
        &self.board.id
    }

    pub fn work_centers(&self) -> &[WorkCenter] {
        &self.board.work_centers
    }

    pub fn operations(&self) -> &[Operation] {
        &self.board.operations
    }

    pub fn row_count(&self) -> usize {
        self.board.work_centers.len()
    }

    pub fn row_index(&self, work_center_id: &str) -> Option<usize> {
        self.rows.get(work_center_id).copied()
    }

    pub fn work_center(&self, id: &str) -> Option<&WorkCenter> {
        self.row_index(id).map(|i| &self.board.work_centers[i])
    }

    pub fn work_center_at(&self, row: usize) -> Option<&WorkCenter> {
        self.board.work_centers.get(row)
    }

    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.ops.get(id).map(|&i| &self.board.operations[i])
    }

    /// Row of an operation, or `None` when it points at an unknown work center.
    pub fn operation_row(&self, operation_id: &str) -> Option<usize> {
        self.operation(operation_id)
            .and_then(|op| self.row_index(&op.work_center_id))
    }

    /// Operations that have a row, with their row index, in board order.
    pub fn placed_operations(&self) -> impl Iterator<Item = (usize, &Operation)> {
        self.board
            .operations
            .iter()
            .filter_map(|op| self.row_index(&op.work_center_id).map(|row| (row, op)))
    }

    /// Merge `patch` into the operation with the given id.
    ///
    /// Unknown ids are silently ignored (late updates for removed operations).
    /// Returns true if the operation exists.
    pub fn apply_partial_update(&mut self, operation_id: &str, patch: &OperationPatch) -> bool {
        let Some(&idx) = self.ops.get(operation_id) else {
            debug!("partial update for unknown operation {operation_id}, dropped");
            return false;
        };
        let op = &mut self.board.operations[idx];
        if op.apply(patch) {
            debug!("operation {operation_id} updated");
        }
        if let Some(ref wc) = patch.work_center_id {
            if !self.rows.contains_key(wc) {
                warn!("operation {operation_id} moved to unknown work center {wc}");
            }
        }
        true
    }

    /// Swap in an authoritative board and rebuild both indices.
    pub fn replace_full_board(&mut self, board: Board) {
        for problem in board.validate() {
            warn!("board {}: {problem}", board.id);
        }

        let mut rows = HashMap::with_capacity(board.work_centers.len());
        for (i, wc) in board.work_centers.iter().enumerate() {
            rows.entry(wc.id.clone()).or_insert(i);
        }
        let mut ops = HashMap::with_capacity(board.operations.len());
        for (i, op) in board.operations.iter().enumerate() {
            ops.entry(op.id.clone()).or_insert(i);
        }

        debug!(
            "board {} installed: {} work centers, {} operations",
            board.id,
            board.work_centers.len(),
            board.operations.len()
        );
        self.board = board;
        self.rows = rows;
        self.ops = ops;
    }
}
