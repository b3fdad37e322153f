//! Scheduling board core: work centers, operations, and the pointer-driven
//! timeline editor that moves them around.
//!
//! Everything in this crate is synchronous and side-effect free apart from
//! `tracing` output. Network sync lives in `mfgsuite-sync`.
//!
//! # Pieces
//!
//! - [`TimeScale`] / [`ViewWindow`]: time ↔ pixel mapping and snapping
//! - [`BoardModel`]: canonical board with row / operation indices
//! - [`DragController`]: move / resize-start / resize-end gesture state machine
//! - [`ScheduleState`]: board + gesture + queued live deltas, the unit a view owns
//!
//! # Example
//!
//! ```ignore
//! use mfgsuite_schedule::{DragMode, DragOutcome, Point, ScheduleState, TimeScale, ViewWindow};
//!
//! let mut state = ScheduleState::new(board, true);
//! let scale = TimeScale::new(ViewWindow::derive(state.model().operations(), now), 1200.0);
//!
//! state.pointer_down("OP-1", DragMode::Move, Point::new(100.0, 60.0));
//! state.pointer_move(&scale, Point::new(160.0, 60.0));
//! if let Some(DragOutcome::Committed { operation_id, patch }) = state.pointer_up() {
//!     // hand off to OptimisticSync
//! }
//! ```

pub mod board;
pub mod drag;
pub mod error;
pub mod model;
pub mod scale;
pub mod state;

pub use board::BoardModel;
pub use drag::{
    BlockGeometry, DEFAULT_MIN_DURATION_MINUTES, DragController, DragMode, DragOutcome,
    DragSession, Hit, Layout, Point,
};
pub use error::ModelError;
pub use model::{Board, Operation, OperationPatch, OperationStatus, WorkCenter};
pub use scale::{DEFAULT_SNAP_MINUTES, MIN_BLOCK_WIDTH, TimeScale, ViewWindow, snap};
pub use state::{DeltaDisposition, ScheduleState};
