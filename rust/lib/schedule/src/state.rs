use chrono::{DateTime, Utc};
use tracing::debug;

use crate::board::BoardModel;
use crate::drag::{BlockGeometry, DragController, DragMode, DragOutcome, Point};
use crate::model::{Board, OperationPatch};
use crate::scale::{TimeScale, ViewWindow};

/// What happened to an incoming partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaDisposition {
    Applied,
    /// Targets the operation under the pointer; held until the gesture ends.
    Queued,
    /// Unknown operation id.
    Ignored,
}

/// Board model and drag controller kept consistent with each other.
///
/// While a gesture is running, partial updates for the dragged operation are
/// held back and applied in arrival order once the gesture finishes, so the
/// block under the pointer never jumps. A full snapshot is applied at once and
/// drops anything held back; the gesture survives only if its operation is
/// still on the new board.
#[derive(Debug, Clone)]
pub struct ScheduleState {
    model: BoardModel,
    drag: DragController,
    queued: Vec<(String, OperationPatch)>,
}

impl ScheduleState {
    pub fn new(board: Board, editable: bool) -> Self {
        Self::with_controller(board, DragController::new(editable))
    }

    pub fn with_controller(board: Board, drag: DragController) -> Self {
        Self {
            model: BoardModel::new(board),
            drag,
            queued: Vec::new(),
        }
    }

    pub fn model(&self) -> &BoardModel {
        &self.model
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn board(&self) -> &Board {
        self.model.board()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn view_window(&self, now: DateTime<Utc>) -> ViewWindow {
        ViewWindow::derive(self.model.operations(), now)
    }

    /// Returns the ids of held deltas applied because the gesture was aborted.
    pub fn set_editable(&mut self, editable: bool) -> Vec<String> {
        let was_dragging = self.drag.is_dragging();
        self.drag.set_editable(editable);
        if was_dragging && !self.drag.is_dragging() {
            return self.flush_queued();
        }
        Vec::new()
    }

    // ── Remote changes ──

    /// Route a live partial update.
    pub fn apply_delta(&mut self, operation_id: &str, patch: OperationPatch) -> DeltaDisposition {
        if let Some(session) = self.drag.session() {
            if session.operation_id == operation_id {
                debug!("delta for {operation_id} held until drag ends");
                self.queued.push((operation_id.to_string(), patch));
                return DeltaDisposition::Queued;
            }
        }
        if self.model.apply_partial_update(operation_id, &patch) {
            DeltaDisposition::Applied
        } else {
            DeltaDisposition::Ignored
        }
    }

    /// Install an authoritative board.
    pub fn replace_board(&mut self, board: Board) {
        if !self.queued.is_empty() {
            debug!("full snapshot supersedes {} held deltas", self.queued.len());
            self.queued.clear();
        }
        let live_work_center = self
            .drag
            .session()
            .and_then(|s| self.model.work_center_at(s.live_row))
            .map(|wc| wc.id.clone());
        self.model.replace_full_board(board);

        if self.drag.is_dragging() {
            self.drag.rebase(&self.model, live_work_center.as_deref());
        }
    }

    /// Apply a local change straight to the model, bypassing the drag queue.
    pub fn apply_local(&mut self, operation_id: &str, patch: &OperationPatch) -> bool {
        self.model.apply_partial_update(operation_id, patch)
    }

    // ── Pointer ──

    pub fn pointer_down_at(&mut self, scale: &TimeScale, point: Point) -> bool {
        self.drag.pointer_down_at(&self.model, scale, point)
    }

    pub fn pointer_down(&mut self, operation_id: &str, mode: DragMode, point: Point) -> bool {
        self.drag.pointer_down(&self.model, operation_id, mode, point)
    }

    pub fn pointer_move(&mut self, scale: &TimeScale, point: Point) -> bool {
        self.drag.pointer_move(&self.model, scale, point)
    }

    /// Finish the gesture against the pre-gesture values, then apply any
    /// held deltas. The caller commits the outcome on top of them.
    pub fn pointer_up(&mut self) -> Option<DragOutcome> {
        self.pointer_up_flushed().map(|(outcome, _)| outcome)
    }

    /// Like [`pointer_up`](Self::pointer_up), also returning the ids of the
    /// held deltas that were applied.
    pub fn pointer_up_flushed(&mut self) -> Option<(DragOutcome, Vec<String>)> {
        let outcome = self.drag.pointer_up(&self.model)?;
        Some((outcome, self.flush_queued()))
    }

    pub fn cancel(&mut self) -> Option<DragOutcome> {
        self.cancel_flushed().map(|(outcome, _)| outcome)
    }

    pub fn cancel_flushed(&mut self) -> Option<(DragOutcome, Vec<String>)> {
        let outcome = self.drag.cancel()?;
        Some((outcome, self.flush_queued()))
    }

    pub fn block_geometry(&self, scale: &TimeScale) -> Vec<BlockGeometry> {
        self.drag.block_geometry(&self.model, scale)
    }

    /// Apply held deltas in arrival order. Returns the affected ids, each once.
    fn flush_queued(&mut self) -> Vec<String> {
        let mut applied: Vec<String> = Vec::new();
        for (id, patch) in std::mem::take(&mut self.queued) {
            if self.model.apply_partial_update(&id, &patch) && !applied.contains(&id) {
                applied.push(id);
            }
        }
        applied
    }
}
