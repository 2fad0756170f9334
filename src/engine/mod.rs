mod admission;
mod cancellation;
mod error;
mod mutations;
mod queries;
mod status;
mod store;

pub use admission::{Proposal, admit};
pub use cancellation::authorize_cancel;
pub use error::{EngineError, Missing};
pub use mutations::{InstantBooking, RoomUpdate};
pub use status::{Derived, derive_status, next_transition, room_view};
pub use store::{RoomStore, SharedRoomState, default_floor, floor_label};

use std::io;
use std::sync::Arc;

use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::snapshot::{RoomRecord, SnapshotStore};

// ── Coalescing snapshot writer ───────────────────────────

pub(super) enum PersistCommand {
    /// Some room changed; a save is due.
    Dirty,
    /// Save now and report once the state as of this call is on disk.
    Flush { response: oneshot::Sender<io::Result<()>> },
}

/// Background task that owns snapshot saving.
/// 1. Block until any command arrives.
/// 2. Drain everything immediately available (the coalescing window).
/// 3. Read-lock each room once and build one snapshot.
/// 4. Save it and answer every Flush waiter with the result.
async fn persist_writer_loop(
    store: Arc<RoomStore>,
    snapshots: Arc<dyn SnapshotStore>,
    mut rx: mpsc::Receiver<PersistCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        let mut waiters = Vec::new();
        let mut batched = 1usize;
        if let PersistCommand::Flush { response } = cmd {
            waiters.push(response);
        }
        while let Ok(cmd) = rx.try_recv() {
            batched += 1;
            if let PersistCommand::Flush { response } = cmd {
                waiters.push(response);
            }
        }

        let records = snapshot_records(&store).await;
        let save_start = std::time::Instant::now();
        let result = snapshots.save(&records);
        metrics::histogram!(crate::observability::SNAPSHOT_SAVE_DURATION_SECONDS)
            .record(save_start.elapsed().as_secs_f64());

        match &result {
            Ok(()) => debug!("saved snapshot of {} rooms ({batched} changes coalesced)", records.len()),
            Err(e) => {
                metrics::counter!(crate::observability::SNAPSHOT_SAVE_FAILURES_TOTAL).increment(1);
                warn!("snapshot save failed: {e}");
            }
        }
        for tx in waiters {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }
    }
}

/// Consistent per-room snapshot, ordered by room id.
async fn snapshot_records(store: &RoomStore) -> Vec<RoomRecord> {
    let mut ids = store.room_ids();
    ids.sort();
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(rs) = store.get_room(&id) {
            let guard = rs.read().await;
            records.push(RoomRecord::from_state(&guard));
        }
    }
    records
}

pub struct Engine {
    pub(super) store: Arc<RoomStore>,
    pub(super) persist_tx: mpsc::Sender<PersistCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) clock: Arc<dyn Clock>,
    /// Signalled after every mutation so the scheduler re-derives early.
    pub(super) changed: Arc<Notify>,
}

impl Engine {
    /// Take ownership of loaded rooms and start the snapshot writer.
    /// Must be called inside a tokio runtime.
    pub fn new(
        rooms: Vec<RoomState>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        notify: Arc<NotifyHub>,
    ) -> Result<Self, EngineError> {
        let store = Arc::new(RoomStore::new());
        for rs in rooms {
            store.insert_room(rs)?;
        }
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(store.room_count() as f64);

        let (persist_tx, persist_rx) = mpsc::channel(4096);
        tokio::spawn(persist_writer_loop(store.clone(), snapshots, persist_rx));

        Ok(Self {
            store,
            persist_tx,
            notify,
            clock,
            changed: Arc::new(Notify::new()),
        })
    }

    pub fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Handle the scheduler waits on for early wake-ups.
    pub fn changed(&self) -> Arc<Notify> {
        self.changed.clone()
    }

    /// Queue a save and wake the scheduler. Never blocks: a full queue
    /// already holds a pending save that will see this change.
    pub(super) fn mark_dirty(&self) {
        match self.persist_tx.try_send(PersistCommand::Dirty) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => warn!("snapshot writer shut down"),
        }
        self.changed.notify_one();
    }

    /// Wait until everything committed before this call has been saved.
    pub async fn flush(&self) -> io::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.persist_tx
            .send(PersistCommand::Flush { response: tx })
            .await
            .map_err(|_| io::Error::other("snapshot writer shut down"))?;
        rx.await
            .map_err(|_| io::Error::other("snapshot writer dropped response"))?
    }

    /// Copy of every room's state, ordered by room id.
    pub async fn snapshot(&self) -> Vec<RoomState> {
        let mut ids = self.store.room_ids();
        ids.sort();
        let mut rooms = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rs) = self.store.get_room(&id) {
                rooms.push(rs.read().await.clone());
            }
        }
        rooms
    }

    pub fn room_ids(&self) -> Vec<Ulid> {
        self.store.room_ids()
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.store.get_room(id)
    }

    /// Record a rejected request for metrics and debug logging.
    pub(super) fn rejected(&self, op: &'static str, e: &EngineError) {
        metrics::counter!(
            crate::observability::REQUESTS_REJECTED_TOTAL,
            "op" => op,
            "reason" => e.reason()
        )
        .increment(1);
        debug!("{op} rejected: {e}");
    }
}
