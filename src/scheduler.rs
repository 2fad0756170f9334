use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};
use ulid::Ulid;

use crate::engine::{Engine, next_transition, room_view};
use crate::model::*;

/// Outcome of one re-derivation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Rooms whose display state differs from what was last published.
    pub changes: Vec<RoomView>,
    /// Earliest instant at which any room's status can change next.
    pub next_wakeup: Option<Ms>,
}

/// Re-derives every room and publishes only what changed.
pub struct Scheduler {
    engine: Arc<Engine>,
    published: Mutex<HashMap<Ulid, RoomView>>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            published: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn tick(&self) -> TickReport {
        self.tick_at(self.engine.now()).await
    }

    /// One pass at `now`. Idempotent: a second pass at the same instant
    /// publishes nothing.
    pub async fn tick_at(&self, now: Ms) -> TickReport {
        let started = std::time::Instant::now();
        let mut published = self.published.lock().await;
        let mut live = HashSet::new();
        let mut report = TickReport::default();

        for id in self.engine.room_ids() {
            let Some(rs) = self.engine.get_room(&id) else {
                continue;
            };
            let (view, transition) = {
                let guard = rs.read().await;
                (room_view(&guard, now), next_transition(&guard.bookings, now))
            };
            live.insert(id);
            report.next_wakeup = match (report.next_wakeup, transition) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            if published.get(&id) != Some(&view) {
                published.insert(id, view.clone());
                report.changes.push(view);
            }
        }
        // Deleted rooms already announced themselves.
        published.retain(|id, _| live.contains(id));
        drop(published);

        report
            .changes
            .sort_by(|a, b| a.name.cmp(&b.name).then(a.room_id.cmp(&b.room_id)));
        for view in &report.changes {
            info!("room {} ({}) is {}: {}", view.room_id, view.name, view.status, view.title);
            self.engine.notify.send(&Event::StatusChanged { view: view.clone() });
        }

        metrics::counter!(crate::observability::STATUS_TRANSITIONS_TOTAL).increment(report.changes.len() as u64);
        metrics::histogram!(crate::observability::SCHEDULER_TICK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        report
    }
}

/// Background auto-release loop. Sleeps until the next status transition,
/// never longer than `max_period`, and wakes early after any mutation.
pub async fn run_scheduler(scheduler: Arc<Scheduler>, max_period: Duration) {
    let changed = scheduler.engine.changed();
    loop {
        let report = scheduler.tick().await;
        let now = scheduler.engine.now();
        let sleep_for = match report.next_wakeup {
            Some(at) => Duration::from_millis((at - now).max(0) as u64).min(max_period),
            None => max_period,
        };
        debug!("scheduler sleeping {sleep_for:?}");
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = changed.notified() => {}
        }
    }
}
