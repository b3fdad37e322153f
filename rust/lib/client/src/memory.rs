//! In-process [`ScheduleSource`] for demos and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mfgsuite_schedule::{Board, Operation, OperationPatch, OperationStatus, WorkCenter};
use tracing::debug;

use crate::auth::RequestContext;
use crate::error::ApiError;
use crate::source::ScheduleSource;

pub const DEMO_BOARD_ID: &str = "default";

/// Boards held in memory, keyed by id.
///
/// Writes are validated like a real backend would: unknown operations are a
/// 404, unknown work centers and inverted spans a 422.
#[derive(Default)]
pub struct MemorySource {
    boards: Mutex<HashMap<String, Board>>,
    required_token: Option<String>,
    latency: Mutex<Option<Duration>>,
    fail_updates: AtomicUsize,
    fail_fetches: AtomicUsize,
    fetches: AtomicUsize,
    updates: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_board(board: Board) -> Self {
        let src = Self::new();
        src.put_board(board);
        src
    }

    /// Four work centers and three operations around the current hour.
    pub fn demo(now: DateTime<Utc>) -> Self {
        Self::with_board(demo_board(now))
    }

    /// Reject every call whose context does not carry `token`.
    pub fn require_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// The next `n` updates fail with a 503.
    pub fn fail_next_updates(&self, n: usize) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    /// The next `n` board fetches fail with a 503.
    pub fn fail_next_fetches(&self, n: usize) {
        self.fail_fetches.store(n, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn put_board(&self, board: Board) {
        self.lock().insert(board.id.clone(), board);
    }

    pub fn board(&self, board_id: &str) -> Option<Board> {
        self.lock().get(board_id).cloned()
    }

    pub fn list_operations(&self, board_id: &str) -> Result<Vec<Operation>, ApiError> {
        let boards = self.lock();
        let board = boards.get(board_id).ok_or_else(|| board_not_found(board_id))?;
        Ok(board.operations.clone())
    }

    pub fn create_operation(&self, board_id: &str, op: Operation) -> Result<Operation, ApiError> {
        let mut boards = self.lock();
        let board = boards.get_mut(board_id).ok_or_else(|| board_not_found(board_id))?;
        if board.operation(&op.id).is_some() {
            return Err(ApiError::Server {
                status: 409,
                message: format!("operation '{}' already exists", op.id),
            });
        }
        check_operation(board, &op)?;
        board.operations.push(op.clone());
        Ok(op)
    }

    /// Server-side change that does not go through the update endpoint
    /// (status transitions, another planner's edit).
    pub fn patch_operation(
        &self,
        board_id: &str,
        operation_id: &str,
        patch: &OperationPatch,
    ) -> Result<Operation, ApiError> {
        let mut boards = self.lock();
        let board = boards.get_mut(board_id).ok_or_else(|| board_not_found(board_id))?;
        let idx = board
            .operations
            .iter()
            .position(|o| o.id == operation_id)
            .ok_or_else(|| operation_not_found(operation_id))?;

        let mut next = board.operations[idx].clone();
        next.apply(patch);
        check_operation(board, &next)?;
        board.operations[idx] = next.clone();
        Ok(next)
    }

    pub fn delete_operation(&self, board_id: &str, operation_id: &str) -> Result<(), ApiError> {
        let mut boards = self.lock();
        let board = boards.get_mut(board_id).ok_or_else(|| board_not_found(board_id))?;
        let len = board.operations.len();
        board.operations.retain(|o| o.id != operation_id);
        if board.operations.len() == len {
            return Err(operation_not_found(operation_id));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Board>> {
        self.boards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn gate(&self, ctx: &RequestContext) -> Result<(), ApiError> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        match self.required_token {
            Some(ref want) if ctx.token.as_deref() != Some(want.as_str()) => Err(ApiError::Unauthorized),
            _ => Ok(()),
        }
    }
}

/// Decrement `counter` if positive. Returns true if a failure was consumed.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected() -> ApiError {
    ApiError::Server {
        status: 503,
        message: "injected failure".into(),
    }
}

fn board_not_found(board_id: &str) -> ApiError {
    ApiError::Server {
        status: 404,
        message: format!("board '{board_id}' not found"),
    }
}

fn operation_not_found(operation_id: &str) -> ApiError {
    ApiError::Server {
        status: 404,
        message: format!("operation '{operation_id}' not found"),
    }
}

fn check_operation(board: &Board, op: &Operation) -> Result<(), ApiError> {
    if !board.work_centers.iter().any(|wc| wc.id == op.work_center_id) {
        return Err(ApiError::Server {
            status: 422,
            message: format!("unknown work center '{}'", op.work_center_id),
        });
    }
    if op.end <= op.start {
        return Err(ApiError::Server {
            status: 422,
            message: "end must be after start".into(),
        });
    }
    Ok(())
}

#[async_trait::async_trait]
impl ScheduleSource for MemorySource {
    async fn get_board(&self, ctx: &RequestContext, board_id: &str) -> Result<Board, ApiError> {
        self.gate(ctx).await?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_fetches) {
            debug!("get_board {board_id}: injected failure");
            return Err(injected());
        }
        self.board(board_id).ok_or_else(|| board_not_found(board_id))
    }

    async fn update_operation(
        &self,
        ctx: &RequestContext,
        board_id: &str,
        operation_id: &str,
        patch: &OperationPatch,
    ) -> Result<Operation, ApiError> {
        self.gate(ctx).await?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_updates) {
            debug!("update_operation {operation_id}: injected failure");
            return Err(injected());
        }
        self.patch_operation(board_id, operation_id, &patch.without_status())
    }
}

// ── Demo data ───────────────────────────────────────────────────────

fn demo_board(now: DateTime<Utc>) -> Board {
    let hour_ms = 3_600_000;
    let base = DateTime::from_timestamp_millis(now.timestamp_millis().div_euclid(hour_ms) * hour_ms)
        .unwrap_or(now);
    let at = |minutes: i64| base + TimeDelta::minutes(minutes);

    let wc = |id: &str, name: &str, color: &str| WorkCenter {
        color: Some(color.into()),
        ..WorkCenter::new(id, name)
    };
    let op = |id: &str, wo: &str, row: &str, span: (i64, i64), status, item: &str, qty: f64, color: &str| {
        Operation {
            id: id.into(),
            work_order_no: wo.into(),
            work_center_id: row.into(),
            start: at(span.0),
            end: at(span.1),
            status,
            item: Some(item.into()),
            quantity: Some(qty),
            color: Some(color.into()),
        }
    };

    Board {
        id: DEMO_BOARD_ID.into(),
        name: Some("Default Board".into()),
        work_centers: vec![
            wc("WC-10", "CNC-10", "#1976d2"),
            wc("WC-20", "Mill-20", "#9c27b0"),
            wc("WC-30", "Lathe-30", "#ff6600"),
            wc("WC-40", "QC-40", "#2e7d32"),
        ],
        operations: vec![
            op("OP-1001", "WO-1001", "WC-10", (-30, 60), OperationStatus::InProgress, "WIDGET-A", 120.0, "#1976d2"),
            op("OP-1002", "WO-1001", "WC-20", (60, 180), OperationStatus::Planned, "WIDGET-A", 120.0, "#9c27b0"),
            op("OP-2001", "WO-2001", "WC-30", (30, 150), OperationStatus::Planned, "WIDGET-B", 80.0, "#ff6600"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2024-05-01T10:42:13Z".parse().unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::anonymous()
    }

    #[test]
    fn demo_board_shape() {
        let src = MemorySource::demo(now());
        let board = src.board(DEMO_BOARD_ID).unwrap();
        assert_eq!(board.work_centers.len(), 4);
        assert_eq!(board.operations.len(), 3);
        assert!(board.validate().is_empty());

        let op = board.operation("OP-1001").unwrap();
        assert_eq!(op.start, ts("2024-05-01T09:30:00Z"));
        assert_eq!(op.end, ts("2024-05-01T11:00:00Z"));
        assert_eq!(op.status, OperationStatus::InProgress);
    }

    #[tokio::test]
    async fn update_applies_and_ignores_status() {
        let src = MemorySource::demo(now());
        let patch = OperationPatch {
            start: Some(ts("2024-05-01T12:00:00Z")),
            status: Some(OperationStatus::Completed),
            ..Default::default()
        };
        let op = src
            .update_operation(&ctx(), DEMO_BOARD_ID, "OP-1002", &patch)
            .await
            .unwrap();
        assert_eq!(op.start, ts("2024-05-01T12:00:00Z"));
        assert_eq!(op.status, OperationStatus::Planned);
        assert_eq!(src.update_count(), 1);
    }

    #[tokio::test]
    async fn update_rejections() {
        let src = MemorySource::demo(now());
        let to_nowhere = OperationPatch {
            work_center_id: Some("WC-99".into()),
            ..Default::default()
        };
        let err = src
            .update_operation(&ctx(), DEMO_BOARD_ID, "OP-1001", &to_nowhere)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));

        let inverted = OperationPatch {
            end: Some(ts("2024-05-01T08:00:00Z")),
            ..Default::default()
        };
        let err = src
            .update_operation(&ctx(), DEMO_BOARD_ID, "OP-1001", &inverted)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));

        let err = src
            .update_operation(&ctx(), DEMO_BOARD_ID, "OP-404", &inverted)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));

        // Rejected writes leave the board alone.
        assert_eq!(src.board(DEMO_BOARD_ID).unwrap(), MemorySource::demo(now()).board(DEMO_BOARD_ID).unwrap());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let src = MemorySource::demo(now());
        src.fail_next_fetches(2);
        assert!(src.get_board(&ctx(), DEMO_BOARD_ID).await.is_err());
        assert!(src.get_board(&ctx(), DEMO_BOARD_ID).await.is_err());
        assert!(src.get_board(&ctx(), DEMO_BOARD_ID).await.is_ok());
        assert_eq!(src.fetch_count(), 3);

        src.fail_next_updates(1);
        let patch = OperationPatch {
            work_center_id: Some("WC-40".into()),
            ..Default::default()
        };
        let err = src
            .update_operation(&ctx(), DEMO_BOARD_ID, "OP-2001", &patch)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(src
            .update_operation(&ctx(), DEMO_BOARD_ID, "OP-2001", &patch)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn required_token_is_checked() {
        let src = MemorySource::demo(now()).require_token("secret");
        let err = src.get_board(&ctx(), DEMO_BOARD_ID).await.unwrap_err();
        assert!(err.is_unauthorized());
        let ok = RequestContext::anonymous().with_token("secret");
        assert!(src.get_board(&ok, DEMO_BOARD_ID).await.is_ok());
    }

    #[test]
    fn create_list_delete() {
        let src = MemorySource::demo(now());
        let mut op = src.list_operations(DEMO_BOARD_ID).unwrap()[0].clone();
        assert!(src.create_operation(DEMO_BOARD_ID, op.clone()).is_err());

        op.id = "OP-3001".into();
        src.create_operation(DEMO_BOARD_ID, op).unwrap();
        assert_eq!(src.list_operations(DEMO_BOARD_ID).unwrap().len(), 4);

        src.delete_operation(DEMO_BOARD_ID, "OP-3001").unwrap();
        assert_eq!(src.delete_operation(DEMO_BOARD_ID, "OP-3001").unwrap_err().status(), Some(404));
        assert_eq!(src.list_operations(DEMO_BOARD_ID).unwrap().len(), 3);
        assert!(src.list_operations("nope").is_err());
    }
}
