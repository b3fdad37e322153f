use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mfgsuite_schedule::{
    Board, DeltaDisposition, DragMode, DragOutcome, Operation, OperationPatch, Point,
    ScheduleState, TimeScale,
};

use crate::live::ChannelEvent;

/// What changed in a [`BoardStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A full board was installed.
    BoardReplaced,
    /// One operation's canonical fields changed.
    OperationChanged { operation_id: String },
    /// A live delta is held until the current gesture ends.
    DeltaQueued { operation_id: String },
    /// Gesture started, moved, ended, or was cancelled.
    GestureChanged,
    /// A local edit was rejected and the board was re-read (or could not be).
    SyncFailed { operation_id: String, message: String },
    Channel(ChannelEvent),
}

pub type ChangeHandler = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Shared scheduling state plus change notifications.
///
/// - `read(f)` / `snapshot()`: look at the current state
/// - `replace_board` / `apply_delta` / `apply_local`: canonical mutations
/// - `pointer_*`: gesture input
/// - `subscribe(handler)`: called after every change
///
/// Handlers run synchronously on the mutating task, after the state lock has
/// been released, so a handler may read the store.
pub struct BoardStore {
    state: RwLock<ScheduleState>,
    handlers: RwLock<Vec<(SubscriptionId, ChangeHandler)>>,
    next_id: AtomicU64,
}

impl BoardStore {
    pub fn new(state: ScheduleState) -> Self {
        Self {
            state: RwLock::new(state),
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ScheduleState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ScheduleState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&ScheduleState) -> R) -> R {
        f(&self.read_state())
    }

    /// Copy of the canonical board.
    pub fn snapshot(&self) -> Board {
        self.read(|s| s.board().clone())
    }

    pub fn board_id(&self) -> String {
        self.read(|s| s.board().id.clone())
    }

    pub fn operation(&self, id: &str) -> Option<Operation> {
        self.read(|s| s.model().operation(id).cloned())
    }

    pub fn is_dragging(&self) -> bool {
        self.read(|s| s.drag().is_dragging())
    }

    // ── Canonical mutations ──

    pub fn replace_board(&self, board: Board) {
        self.write_state().replace_board(board);
        self.publish(&StoreEvent::BoardReplaced);
    }

    pub fn apply_delta(&self, operation_id: &str, patch: OperationPatch) -> DeltaDisposition {
        let disposition = self.write_state().apply_delta(operation_id, patch);
        match disposition {
            DeltaDisposition::Applied => self.publish(&StoreEvent::OperationChanged {
                operation_id: operation_id.to_string(),
            }),
            DeltaDisposition::Queued => self.publish(&StoreEvent::DeltaQueued {
                operation_id: operation_id.to_string(),
            }),
            DeltaDisposition::Ignored => {}
        }
        disposition
    }

    pub fn apply_local(&self, operation_id: &str, patch: &OperationPatch) -> bool {
        let found = self.write_state().apply_local(operation_id, patch);
        if found {
            self.publish(&StoreEvent::OperationChanged {
                operation_id: operation_id.to_string(),
            });
        }
        found
    }

    // ── Gesture input ──

    pub fn set_editable(&self, editable: bool) {
        let was = self.is_dragging();
        let flushed = self.write_state().set_editable(editable);
        if was && !self.is_dragging() {
            self.publish(&StoreEvent::GestureChanged);
        }
        self.publish_flushed(flushed);
    }

    pub fn pointer_down_at(&self, scale: &TimeScale, point: Point) -> bool {
        let started = self.write_state().pointer_down_at(scale, point);
        if started {
            self.publish(&StoreEvent::GestureChanged);
        }
        started
    }

    pub fn pointer_down(&self, operation_id: &str, mode: DragMode, point: Point) -> bool {
        let started = self.write_state().pointer_down(operation_id, mode, point);
        if started {
            self.publish(&StoreEvent::GestureChanged);
        }
        started
    }

    pub fn pointer_move(&self, scale: &TimeScale, point: Point) -> bool {
        let moved = self.write_state().pointer_move(scale, point);
        if moved {
            self.publish(&StoreEvent::GestureChanged);
        }
        moved
    }

    /// End the gesture. Held deltas are applied before this returns.
    pub fn pointer_up(&self) -> Option<DragOutcome> {
        let (outcome, flushed) = self.write_state().pointer_up_flushed()?;
        self.publish(&StoreEvent::GestureChanged);
        self.publish_flushed(flushed);
        Some(outcome)
    }

    pub fn cancel_gesture(&self) -> Option<DragOutcome> {
        let (outcome, flushed) = self.write_state().cancel_flushed()?;
        self.publish(&StoreEvent::GestureChanged);
        self.publish_flushed(flushed);
        Some(outcome)
    }

    fn publish_flushed(&self, ids: Vec<String>) {
        for operation_id in ids {
            self.publish(&StoreEvent::OperationChanged { operation_id });
        }
    }

    // ── Subscriptions ──

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sid, _)| *sid != id);
    }

    /// Notify every subscriber.
    pub fn publish(&self, event: &StoreEvent) {
        let handlers: Vec<ChangeHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}
