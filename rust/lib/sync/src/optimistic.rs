//! Optimistic operation edits with read-repair.
//!
//! `commit` applies the edit to the store first, then writes it once. On
//! success the server's copy of the operation is merged back in; on failure
//! the whole board is re-read and replaces the local one. The write itself is
//! never retried.

use std::sync::Arc;

use mfgsuite_client::{ApiError, CredentialSource, ScheduleSource};
use mfgsuite_schedule::{Board, Operation, OperationPatch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::{BoardStore, StoreEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Written; the returned operation was merged into the board.
    Confirmed(Operation),
    /// Write failed; the board was replaced by a fresh read.
    Repaired { error: String },
    /// Write and re-read both failed. The optimistic value stays until the
    /// next snapshot or refresh.
    Unrepaired { error: String },
    /// Torn down before the result arrived; nothing was applied.
    Abandoned,
    /// Empty patch or unknown operation; nothing was sent.
    Skipped,
}

pub struct OptimisticSync {
    source: Arc<dyn ScheduleSource>,
    credentials: Arc<dyn CredentialSource>,
    store: Arc<BoardStore>,
    cancel: CancellationToken,
}

impl OptimisticSync {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        credentials: Arc<dyn CredentialSource>,
        store: Arc<BoardStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            credentials,
            store,
            cancel,
        }
    }

    pub async fn commit(&self, operation_id: &str, patch: OperationPatch) -> CommitOutcome {
        if self.cancel.is_cancelled() {
            return CommitOutcome::Abandoned;
        }
        let patch = patch.without_status();
        if patch.is_empty() || !self.store.apply_local(operation_id, &patch) {
            return CommitOutcome::Skipped;
        }
        let board_id = self.store.board_id();
        debug!("commit {operation_id} on {board_id}: {patch:?}");

        let written = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.abandoned(operation_id),
            r = self.write(&board_id, operation_id, &patch) => r,
        };
        if self.cancel.is_cancelled() {
            return self.abandoned(operation_id);
        }

        let error = match written {
            Ok(op) => {
                self.store
                    .apply_local(operation_id, &OperationPatch::from_operation(&op));
                return CommitOutcome::Confirmed(op);
            }
            Err(e) => e,
        };

        warn!("update of {operation_id} failed, re-reading board {board_id}: {error}");
        let message = error.to_string();
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.abandoned(operation_id),
            r = self.fetch(&board_id) => r,
        };
        if self.cancel.is_cancelled() {
            return self.abandoned(operation_id);
        }

        let outcome = match fetched {
            Ok(board) => {
                self.store.replace_board(board);
                CommitOutcome::Repaired {
                    error: message.clone(),
                }
            }
            Err(e) => {
                warn!("re-read of board {board_id} failed: {e}");
                CommitOutcome::Unrepaired {
                    error: message.clone(),
                }
            }
        };
        self.store.publish(&StoreEvent::SyncFailed {
            operation_id: operation_id.to_string(),
            message,
        });
        outcome
    }

    /// Run [`commit`](Self::commit) on a background task.
    pub fn spawn_commit(
        self: &Arc<Self>,
        operation_id: String,
        patch: OperationPatch,
    ) -> JoinHandle<CommitOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.commit(&operation_id, patch).await })
    }

    /// Re-read the board and replace the local copy.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let board_id = self.store.board_id();
        let board = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            r = self.fetch(&board_id) => r?,
        };
        if !self.cancel.is_cancelled() {
            self.store.replace_board(board);
        }
        Ok(())
    }

    async fn write(
        &self,
        board_id: &str,
        operation_id: &str,
        patch: &OperationPatch,
    ) -> Result<Operation, ApiError> {
        let ctx = self.credentials.context().await?;
        self.source
            .update_operation(&ctx, board_id, operation_id, patch)
            .await
    }

    async fn fetch(&self, board_id: &str) -> Result<Board, ApiError> {
        let ctx = self.credentials.context().await?;
        self.source.get_board(&ctx, board_id).await
    }

    fn abandoned(&self, operation_id: &str) -> CommitOutcome {
        debug!("commit {operation_id}: torn down, late result dropped");
        CommitOutcome::Abandoned
    }
}
