//! One open scheduling board: store, optimistic writes, and the live channel,
//! all torn down together.

use std::sync::Arc;

use mfgsuite_client::{ApiError, CredentialSource, DEMO_BOARD_ID, ScheduleSource};
use mfgsuite_schedule::{
    DEFAULT_MIN_DURATION_MINUTES, DEFAULT_SNAP_MINUTES, DragController, DragMode, DragOutcome,
    Layout, Point, ScheduleState, TimeScale,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::live::{LiveTransport, LiveUpdateChannel, ReconnectPolicy};
use crate::optimistic::{CommitOutcome, OptimisticSync};
use crate::store::BoardStore;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub board_id: String,
    pub snap_minutes: i64,
    pub min_duration_minutes: i64,
    pub layout: Layout,
    pub reconnect: ReconnectPolicy,
    /// Whether gestures may start. Usually `Roles::can_edit_schedule()`.
    pub editable: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            board_id: DEMO_BOARD_ID.to_string(),
            snap_minutes: DEFAULT_SNAP_MINUTES,
            min_duration_minutes: DEFAULT_MIN_DURATION_MINUTES,
            layout: Layout::default(),
            reconnect: ReconnectPolicy::default(),
            editable: false,
        }
    }
}

pub struct SchedulerSession {
    store: Arc<BoardStore>,
    sync: Arc<OptimisticSync>,
    cancel: CancellationToken,
    live: Option<JoinHandle<()>>,
}

impl SchedulerSession {
    /// Load the board and, when a transport is given, start following it live.
    pub async fn start(
        config: SessionConfig,
        source: Arc<dyn ScheduleSource>,
        credentials: Arc<dyn CredentialSource>,
        transport: Option<Arc<dyn LiveTransport>>,
    ) -> Result<Self, ApiError> {
        let ctx = credentials.context().await?;
        let board = source.get_board(&ctx, &config.board_id).await?;
        info!(
            "board {} loaded: {} work centers, {} operations",
            board.id,
            board.work_centers.len(),
            board.operations.len()
        );

        let drag = DragController::new(config.editable)
            .with_snap_minutes(config.snap_minutes)
            .with_min_duration_minutes(config.min_duration_minutes)
            .with_layout(config.layout);
        let store = Arc::new(BoardStore::new(ScheduleState::with_controller(board, drag)));
        let cancel = CancellationToken::new();
        let sync = Arc::new(OptimisticSync::new(
            source,
            credentials.clone(),
            store.clone(),
            cancel.clone(),
        ));

        let live = transport.map(|transport| {
            LiveUpdateChannel::new(transport, credentials, config.board_id.clone())
                .with_policy(config.reconnect)
                .spawn(store.clone(), cancel.clone())
        });

        Ok(Self {
            store,
            sync,
            cancel,
            live,
        })
    }

    pub fn store(&self) -> &Arc<BoardStore> {
        &self.store
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn set_editable(&self, editable: bool) {
        self.store.set_editable(editable);
    }

    pub fn pointer_down_at(&self, scale: &TimeScale, point: Point) -> bool {
        !self.is_shut_down() && self.store.pointer_down_at(scale, point)
    }

    pub fn pointer_down(&self, operation_id: &str, mode: DragMode, point: Point) -> bool {
        !self.is_shut_down() && self.store.pointer_down(operation_id, mode, point)
    }

    pub fn pointer_move(&self, scale: &TimeScale, point: Point) -> bool {
        self.store.pointer_move(scale, point)
    }

    /// End the gesture. Pass a committed outcome to [`commit`](Self::commit)
    /// or [`spawn_commit`](Self::spawn_commit).
    pub fn pointer_up(&self) -> Option<DragOutcome> {
        self.store.pointer_up()
    }

    pub fn cancel_gesture(&self) -> Option<DragOutcome> {
        self.store.cancel_gesture()
    }

    pub async fn commit(&self, outcome: DragOutcome) -> CommitOutcome {
        match outcome {
            DragOutcome::Committed { operation_id, patch } => {
                self.sync.commit(&operation_id, patch).await
            }
            DragOutcome::Unchanged | DragOutcome::Cancelled => CommitOutcome::Skipped,
        }
    }

    /// Commit on a background task; `None` when there is nothing to write.
    pub fn spawn_commit(&self, outcome: DragOutcome) -> Option<JoinHandle<CommitOutcome>> {
        match outcome {
            DragOutcome::Committed { operation_id, patch } => {
                Some(self.sync.spawn_commit(operation_id, patch))
            }
            DragOutcome::Unchanged | DragOutcome::Cancelled => None,
        }
    }

    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.sync.refresh().await
    }

    /// Stop the live channel and drop every pending write result.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.store.cancel_gesture();
        if let Some(handle) = self.live.take() {
            if let Err(e) = handle.await {
                warn!("live channel task ended abnormally: {e}");
            }
        }
        debug!("session for board {} shut down", self.store.board_id());
    }
}

impl Drop for SchedulerSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
