//! Keeps a scheduling board in step with the server.
//!
//! - [`BoardStore`]: shared [`ScheduleState`](mfgsuite_schedule::ScheduleState) plus change subscriptions
//! - [`OptimisticSync`]: apply locally, write once, read-repair on failure
//! - [`LiveUpdateChannel`]: snapshots and deltas pushed by the server, reconnecting with backoff
//! - [`SchedulerSession`]: all of the above for one board, with a single teardown
//!
//! # Usage
//!
//! ```ignore
//! use mfgsuite_sync::{SchedulerSession, SessionConfig, WsTransport};
//!
//! let session = SchedulerSession::start(
//!     SessionConfig { editable: roles.can_edit_schedule(), ..Default::default() },
//!     Arc::new(HttpSource::new(server)?),
//!     creds,
//!     Some(Arc::new(WsTransport::new(server))),
//! )
//! .await?;
//!
//! session.pointer_down_at(&scale, point);
//! session.pointer_move(&scale, next);
//! if let Some(outcome) = session.pointer_up() {
//!     session.spawn_commit(outcome);
//! }
//! session.shutdown().await;
//! ```

pub mod live;
pub mod message;
pub mod optimistic;
pub mod session;
pub mod store;
pub mod transport;

pub use live::{ChannelEvent, LiveConnection, LiveTransport, LiveUpdateChannel, ReconnectPolicy};
pub use message::{Frame, LiveMessage, decode_frame};
pub use optimistic::{CommitOutcome, OptimisticSync};
pub use session::{SchedulerSession, SessionConfig};
pub use store::{BoardStore, ChangeHandler, StoreEvent, SubscriptionId};
pub use transport::WsTransport;
