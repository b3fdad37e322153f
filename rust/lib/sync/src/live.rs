//! Reconnecting live subscription for one board.

use std::sync::Arc;
use std::time::Duration;

use mfgsuite_client::{ApiError, CredentialSource, RequestContext};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::{Frame, LiveMessage, decode_frame};
use crate::store::{BoardStore, StoreEvent};

// ── ReconnectPolicy ─────────────────────────────────────────────────

/// Exponential reconnect delay: `initial · 2^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based, reset on open).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

// ── Transport seam ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    /// Connection lost or refused; next attempt after `retry_in`.
    Disconnected { retry_in: Duration },
}

/// Opens live connections. Called with a fresh request context on every
/// (re)connect.
#[async_trait::async_trait]
pub trait LiveTransport: Send + Sync + 'static {
    async fn connect(
        &self,
        ctx: &RequestContext,
        board_id: &str,
    ) -> Result<Box<dyn LiveConnection>, ApiError>;
}

#[async_trait::async_trait]
pub trait LiveConnection: Send {
    /// Next frame, or `None` once the peer has gone away.
    async fn next_frame(&mut self) -> Option<Result<Frame, ApiError>>;

    async fn close(&mut self);
}

// ── LiveUpdateChannel ───────────────────────────────────────────────

enum PumpEnd {
    Cancelled,
    Lost,
}

pub struct LiveUpdateChannel {
    transport: Arc<dyn LiveTransport>,
    credentials: Arc<dyn CredentialSource>,
    board_id: String,
    policy: ReconnectPolicy,
}

impl LiveUpdateChannel {
    pub fn new(
        transport: Arc<dyn LiveTransport>,
        credentials: Arc<dyn CredentialSource>,
        board_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            board_id: board_id.into(),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run on a background task until `cancel` fires.
    pub fn spawn(self, store: Arc<BoardStore>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(store, cancel))
    }

    /// Connect, pump messages into `store`, reconnect with backoff when the
    /// connection drops. Returns once `cancel` fires; the open connection is
    /// closed and no further attempt is scheduled.
    pub async fn run(self, store: Arc<BoardStore>, cancel: CancellationToken) {
        info!("live channel for board {} started", self.board_id);
        let mut attempt: u32 = 0;

        loop {
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = self.connect() => r,
            };

            match connected {
                Ok(mut conn) => {
                    attempt = 0;
                    info!("live channel for board {} connected", self.board_id);
                    store.publish(&StoreEvent::Channel(ChannelEvent::Connected));
                    match pump(conn.as_mut(), &store, &self.board_id, &cancel).await {
                        PumpEnd::Cancelled => {
                            conn.close().await;
                            break;
                        }
                        PumpEnd::Lost => {}
                    }
                }
                Err(e) => warn!("live channel for board {}: connect failed: {e}", self.board_id),
            }

            if cancel.is_cancelled() {
                break;
            }
            let delay = self.policy.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            debug!("live channel for board {}: retry in {delay:?}", self.board_id);
            store.publish(&StoreEvent::Channel(ChannelEvent::Disconnected { retry_in: delay }));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("live channel for board {} stopped", self.board_id);
    }

    async fn connect(&self) -> Result<Box<dyn LiveConnection>, ApiError> {
        let ctx = self.credentials.context().await?;
        self.transport.connect(&ctx, &self.board_id).await
    }
}

async fn pump(
    conn: &mut dyn LiveConnection,
    store: &BoardStore,
    board_id: &str,
    cancel: &CancellationToken,
) -> PumpEnd {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpEnd::Cancelled,
            f = conn.next_frame() => f,
        };
        match frame {
            None | Some(Ok(Frame::Close)) => {
                debug!("live connection closed by peer");
                return PumpEnd::Lost;
            }
            Some(Err(e)) => {
                warn!("live connection error: {e}");
                return PumpEnd::Lost;
            }
            Some(Ok(frame)) => {
                if let Some(msg) = decode_frame(&frame) {
                    apply(store, board_id, msg);
                }
            }
        }
    }
}

fn apply(store: &BoardStore, board_id: &str, msg: LiveMessage) {
    match msg {
        LiveMessage::Snapshot(board) if board.id != board_id => {
            debug!("live: snapshot for board {} dropped, channel is for {board_id}", board.id);
        }
        LiveMessage::Snapshot(board) => {
            debug!("live: snapshot for board {}", board.id);
            store.replace_board(board);
        }
        LiveMessage::Delta { operation_id, patch } => {
            let disposition = store.apply_delta(&operation_id, patch);
            debug!("live: delta for {operation_id}: {disposition:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..8)
            .map(|n| policy.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000, 10000, 10000, 10000]);
    }

    #[test]
    fn backoff_never_overflows() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(31), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(32), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn custom_policy() {
        let policy = ReconnectPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(250),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(250));
    }
}
