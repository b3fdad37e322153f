use mfgsuite_schedule::{Board, Operation, OperationPatch};
use serde::Serialize;

use crate::auth::RequestContext;
use crate::error::ApiError;

/// Where boards come from and where operation edits go.
///
/// Every call receives the request context explicitly; implementations never
/// read credentials from anywhere else.
#[async_trait::async_trait]
pub trait ScheduleSource: Send + Sync + 'static {
    async fn get_board(&self, ctx: &RequestContext, board_id: &str) -> Result<Board, ApiError>;

    /// Write `start`/`end`/`workCenterId` of one operation. `patch.status` is
    /// ignored. Returns the server's view of the operation.
    async fn update_operation(
        &self,
        ctx: &RequestContext,
        board_id: &str,
        operation_id: &str,
        patch: &OperationPatch,
    ) -> Result<Operation, ApiError>;
}

/// Body of an operation update request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOperationRequest {
    #[serde(flatten)]
    pub patch: OperationPatch,
    pub board_id: String,
}

impl UpdateOperationRequest {
    pub fn new(board_id: &str, patch: &OperationPatch) -> Self {
        Self {
            patch: patch.without_status(),
            board_id: board_id.to_string(),
        }
    }
}
