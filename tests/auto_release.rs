use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use roombook::clock::ManualClock;
use roombook::engine::{Engine, EngineError, Proposal};
use roombook::model::*;
use roombook::notify::NotifyHub;
use roombook::scheduler::{Scheduler, run_scheduler};
use roombook::snapshot::MemorySnapshotStore;

const T: Ms = 1_700_000_000_000;
const H: Ms = 3_600_000;
const M: Ms = 60_000;

// ── Test infrastructure ──────────────────────────────────────

struct Daemon {
    engine: Arc<Engine>,
    clock: Arc<ManualClock>,
    scheduler: tokio::task::JoinHandle<()>,
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.scheduler.abort();
    }
}

/// Engine plus a running scheduler on a settable clock.
async fn start_daemon(rooms: &[&str]) -> (Daemon, Vec<Ulid>) {
    let clock = Arc::new(ManualClock::new(T));
    let states: Vec<RoomState> = rooms
        .iter()
        .map(|name| RoomState::new(Ulid::new(), name.to_string(), String::new(), String::new()))
        .collect();
    let ids = states.iter().map(|r| r.id).collect();
    let engine = Arc::new(
        Engine::new(
            states,
            Arc::new(MemorySnapshotStore::new()),
            clock.clone(),
            Arc::new(NotifyHub::new()),
        )
        .unwrap(),
    );
    let scheduler = tokio::spawn(run_scheduler(
        Arc::new(Scheduler::new(engine.clone())),
        Duration::from_millis(5),
    ));
    (
        Daemon {
            engine,
            clock,
            scheduler,
        },
        ids,
    )
}

/// Wait for the next status change with timeout, skipping other events.
async fn recv_status(rx: &mut broadcast::Receiver<Event>, timeout: Duration) -> Option<RoomView> {
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(Event::StatusChanged { view }) => return Some(view),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

fn ana() -> User {
    User::new("u1", "Ana")
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_flips_room_without_further_input() {
    let (daemon, ids) = start_daemon(&["Room 101"]).await;
    let rid = ids[0];
    let mut rx = daemon.engine.notify.subscribe(rid);

    assert_ok!(
        daemon
            .engine
            .try_book(rid, Proposal::new(T + 10 * M, T + 70 * M, "Sprint review"), &ana())
            .await
    );

    // The mutation wakes the scheduler; the room is within the Upcoming window.
    let mut view = recv_status(&mut rx, Duration::from_secs(5)).await.expect("status");
    if view.status == RoomStatus::Available {
        view = recv_status(&mut rx, Duration::from_secs(5)).await.expect("status");
    }
    assert_eq!(view.status, RoomStatus::Upcoming);
    assert_eq!(view.title, "Sprint review");

    daemon.clock.set(T + 10 * M);
    let view = recv_status(&mut rx, Duration::from_secs(5)).await.expect("status");
    assert_eq!(view.status, RoomStatus::Occupied);

    daemon.clock.set(T + 70 * M);
    let view = recv_status(&mut rx, Duration::from_secs(5)).await.expect("status");
    assert_eq!(view.status, RoomStatus::Available);
    assert_eq!(view.window, None);
}

#[tokio::test]
async fn cancellation_releases_room() {
    let (daemon, ids) = start_daemon(&["Room 101"]).await;
    let rid = ids[0];
    let booking = assert_ok!(
        daemon
            .engine
            .try_book(rid, Proposal::new(T, T + H, ""), &ana())
            .await
    );

    let mut rx = daemon.engine.notify.subscribe(rid);
    let err = assert_err!(
        daemon
            .engine
            .try_cancel(rid, booking.id, &User::new("u2", "Ben"), false)
            .await
    );
    assert_eq!(err, EngineError::NotAuthorized);

    assert_ok!(daemon.engine.try_cancel(rid, booking.id, &ana(), false).await);
    loop {
        let view = recv_status(&mut rx, Duration::from_secs(5)).await.expect("status");
        if view.status == RoomStatus::Available {
            break;
        }
    }
}

#[tokio::test]
async fn status_only_on_subscribed_room() {
    let (daemon, ids) = start_daemon(&["Room 101", "Room 201"]).await;
    let (a, b) = (ids[0], ids[1]);

    // Let the first pass publish both rooms before subscribing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut rx_a = daemon.engine.notify.subscribe(a);
    let mut rx_all = daemon.engine.notify.subscribe_all();

    assert_ok!(
        daemon
            .engine
            .try_book(b, Proposal::new(T, T + H, ""), &ana())
            .await
    );
    let view = recv_status(&mut rx_all, Duration::from_secs(5)).await.expect("status");
    assert_eq!(view.room_id, b);
    assert_eq!(view.status, RoomStatus::Occupied);

    assert!(recv_status(&mut rx_a, Duration::from_millis(100)).await.is_none());
}
