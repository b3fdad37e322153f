//! Pointer gesture state machine: `Idle → Dragging(mode) → Idle`.
//!
//! All intermediate positions live in the [`DragSession`]; the canonical
//! [`BoardModel`] is only read here, never written. A finished gesture yields
//! a [`DragOutcome`] that the caller hands to the optimistic sync layer.

use chrono::DateTime;
use tracing::debug;

use crate::board::BoardModel;
use crate::model::OperationPatch;
use crate::scale::{DEFAULT_SNAP_MINUTES, MS_PER_MINUTE, TimeScale, snap};

/// Shortest span a resize may leave behind.
pub const DEFAULT_MIN_DURATION_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragMode {
    /// Block body: shift in time, optionally change row.
    Move,
    /// Left handle: change start only.
    ResizeStart,
    /// Right handle: change end only.
    ResizeEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Vertical geometry of the timeline, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub header_height: f64,
    pub row_height: f64,
    /// Gap between a row's edge and the block drawn inside it.
    pub block_inset: f64,
    pub handle_width: f64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            header_height: 40.0,
            row_height: 56.0,
            block_inset: 6.0,
            handle_width: 8.0,
        }
    }
}

impl Layout {
    pub fn block_top(&self, row: usize) -> f64 {
        self.header_height + row as f64 * self.row_height + self.block_inset
    }

    pub fn block_height(&self) -> f64 {
        (self.row_height - 2.0 * self.block_inset).max(0.0)
    }
}

/// Result of [`DragController::hit_test`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub operation_id: String,
    pub mode: DragMode,
}

/// Where to draw one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGeometry {
    pub operation_id: String,
    pub row: usize,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub dragging: bool,
}

/// Ephemeral state of the one active gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub operation_id: String,
    pub mode: DragMode,
    pub original_start_ms: i64,
    pub original_end_ms: i64,
    pub original_row: usize,
    pub original_work_center_id: String,
    pub pointer_origin: Point,
    pub live_start_ms: i64,
    pub live_end_ms: i64,
    pub live_row: usize,
}

impl DragSession {
    pub fn is_unchanged(&self) -> bool {
        self.live_start_ms == self.original_start_ms
            && self.live_end_ms == self.original_end_ms
            && self.live_row == self.original_row
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    /// Released where it started; nothing to send.
    Unchanged,
    /// Pointer left the surface, the gesture was aborted, or the operation vanished.
    Cancelled,
    /// Only the fields that differ from the original are set.
    Committed {
        operation_id: String,
        patch: OperationPatch,
    },
}

/// Single-pointer drag state machine.
#[derive(Debug, Clone)]
pub struct DragController {
    session: Option<DragSession>,
    editable: bool,
    snap_minutes: i64,
    min_duration_ms: i64,
    layout: Layout,
}

impl DragController {
    pub fn new(editable: bool) -> Self {
        Self {
            session: None,
            editable,
            snap_minutes: DEFAULT_SNAP_MINUTES,
            min_duration_ms: DEFAULT_MIN_DURATION_MINUTES * MS_PER_MINUTE,
            layout: Layout::default(),
        }
    }

    pub fn with_snap_minutes(mut self, minutes: i64) -> Self {
        self.snap_minutes = minutes;
        self
    }

    pub fn with_min_duration_minutes(mut self, minutes: i64) -> Self {
        self.min_duration_ms = minutes.max(0) * MS_PER_MINUTE;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Revoking edit rights mid-gesture aborts the gesture.
    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
        if !editable && self.session.take().is_some() {
            debug!("edit permission revoked, gesture aborted");
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    /// Operation and gesture mode under `point`. Later operations are painted
    /// on top, so they win overlapping hits.
    pub fn hit_test(&self, board: &BoardModel, scale: &TimeScale, point: Point) -> Option<Hit> {
        let height = self.layout.block_height();
        let placed: Vec<_> = board.placed_operations().collect();
        placed.into_iter().rev().find_map(|(row, op)| {
            let left = scale.to_x(op.start_ms());
            let width = scale.to_width(op.start_ms(), op.end_ms());
            let top = self.layout.block_top(row);
            let inside = point.x >= left
                && point.x <= left + width
                && point.y >= top
                && point.y <= top + height;
            if !inside {
                return None;
            }
            let rel = point.x - left;
            let mode = if rel < self.layout.handle_width {
                DragMode::ResizeStart
            } else if rel > width - self.layout.handle_width {
                DragMode::ResizeEnd
            } else {
                DragMode::Move
            };
            Some(Hit {
                operation_id: op.id.clone(),
                mode,
            })
        })
    }

    /// Begin a gesture on `operation_id`.
    ///
    /// Returns false (and changes nothing) when editing is not allowed, a
    /// gesture is already running, or the operation has no row.
    pub fn pointer_down(
        &mut self,
        board: &BoardModel,
        operation_id: &str,
        mode: DragMode,
        point: Point,
    ) -> bool {
        if !self.editable || self.session.is_some() {
            return false;
        }
        let Some(op) = board.operation(operation_id) else {
            return false;
        };
        let Some(row) = board.row_index(&op.work_center_id) else {
            return false;
        };

        debug!("drag start: {operation_id} {mode:?} at row {row}");
        self.session = Some(DragSession {
            operation_id: op.id.clone(),
            mode,
            original_start_ms: op.start_ms(),
            original_end_ms: op.end_ms(),
            original_row: row,
            original_work_center_id: op.work_center_id.clone(),
            pointer_origin: point,
            live_start_ms: op.start_ms(),
            live_end_ms: op.end_ms(),
            live_row: row,
        });
        true
    }

    /// Hit-test `point` and begin a gesture on whatever is under it.
    pub fn pointer_down_at(&mut self, board: &BoardModel, scale: &TimeScale, point: Point) -> bool {
        match self.hit_test(board, scale, point) {
            Some(hit) => self.pointer_down(board, &hit.operation_id, hit.mode, point),
            None => false,
        }
    }

    /// Recompute the session's live values from the pointer offset.
    pub fn pointer_move(&mut self, board: &BoardModel, scale: &TimeScale, point: Point) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let delta = scale.delta_ms(point.x - session.pointer_origin.x);

        match session.mode {
            DragMode::Move => {
                // Snap the shift, not each edge, so the duration survives intact.
                let shift = snap(session.original_start_ms + delta, self.snap_minutes)
                    - session.original_start_ms;
                session.live_start_ms = session.original_start_ms + shift;
                session.live_end_ms = session.original_end_ms + shift;

                let offset = if self.layout.row_height > 0.0 {
                    ((point.y - session.pointer_origin.y) / self.layout.row_height).round() as i64
                } else {
                    0
                };
                let last_row = board.row_count().saturating_sub(1) as i64;
                session.live_row = (session.original_row as i64 + offset).clamp(0, last_row) as usize;
            }
            DragMode::ResizeStart => {
                let candidate = snap(session.original_start_ms + delta, self.snap_minutes);
                session.live_start_ms = candidate.min(session.original_end_ms - self.min_duration_ms);
            }
            DragMode::ResizeEnd => {
                let candidate = snap(session.original_end_ms + delta, self.snap_minutes);
                session.live_end_ms = candidate.max(session.original_start_ms + self.min_duration_ms);
            }
        }
        true
    }

    /// End the gesture. `None` if no gesture was running.
    pub fn pointer_up(&mut self, board: &BoardModel) -> Option<DragOutcome> {
        let session = self.session.take()?;
        if board.operation(&session.operation_id).is_none() {
            debug!("drag end: {} no longer on board", session.operation_id);
            return Some(DragOutcome::Cancelled);
        }

        let mut patch = OperationPatch::default();
        if session.live_start_ms != session.original_start_ms {
            patch.start = DateTime::from_timestamp_millis(session.live_start_ms);
        }
        if session.live_end_ms != session.original_end_ms {
            patch.end = DateTime::from_timestamp_millis(session.live_end_ms);
        }
        if let Some(wc) = board.work_center_at(session.live_row) {
            if wc.id != session.original_work_center_id {
                patch.work_center_id = Some(wc.id.clone());
            }
        }

        if patch.is_empty() {
            debug!("drag end: {} unchanged", session.operation_id);
            return Some(DragOutcome::Unchanged);
        }
        debug!("drag end: {} committed {patch:?}", session.operation_id);
        Some(DragOutcome::Committed {
            operation_id: session.operation_id,
            patch,
        })
    }

    /// Re-anchor the running gesture on a replaced board.
    ///
    /// Rows are looked up again by work center id, so a reordered board keeps
    /// the block on the machines it was on. The gesture is aborted when the
    /// operation is gone or the new board moved it (work center or span).
    /// `live_work_center_id` is the work center under the block before the swap.
    pub fn rebase(&mut self, board: &BoardModel, live_work_center_id: Option<&str>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let row = board.operation(&session.operation_id).and_then(|op| {
            let unmoved = op.work_center_id == session.original_work_center_id
                && op.start_ms() == session.original_start_ms
                && op.end_ms() == session.original_end_ms;
            if unmoved {
                board.row_index(&op.work_center_id)
            } else {
                None
            }
        });
        let Some(row) = row else {
            debug!("drag aborted: {} changed under the pointer", session.operation_id);
            self.session = None;
            return false;
        };

        session.original_row = row;
        session.live_row = live_work_center_id
            .and_then(|id| board.row_index(id))
            .unwrap_or(row);
        true
    }

    /// Abort the gesture (pointer left the surface, escape, teardown).
    pub fn cancel(&mut self) -> Option<DragOutcome> {
        self.session.take().map(|s| {
            debug!("drag cancelled: {}", s.operation_id);
            DragOutcome::Cancelled
        })
    }

    /// Geometry for every placed block; the dragged block follows its session.
    pub fn block_geometry(&self, board: &BoardModel, scale: &TimeScale) -> Vec<BlockGeometry> {
        board
            .placed_operations()
            .map(|(row, op)| {
                let (start, end, row, dragging) = match &self.session {
                    Some(s) if s.operation_id == op.id => {
                        (s.live_start_ms, s.live_end_ms, s.live_row, true)
                    }
                    _ => (op.start_ms(), op.end_ms(), row, false),
                };
                BlockGeometry {
                    operation_id: op.id.clone(),
                    row,
                    left: scale.to_x(start),
                    top: self.layout.block_top(row),
                    width: scale.to_width(start, end),
                    height: self.layout.block_height(),
                    dragging,
                }
            })
            .collect()
    }
}
