use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use roombook::clock::SystemClock;
use roombook::config::Config;
use roombook::engine::Engine;
use roombook::model::Event;
use roombook::notify::NotifyHub;
use roombook::scheduler::{Scheduler, run_scheduler};
use roombook::snapshot::{FileSnapshotStore, load_or_seed};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    roombook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let snapshots = Arc::new(FileSnapshotStore::new(config.snapshot_path()));
    let rooms = load_or_seed(snapshots.as_ref(), config.seed_rooms);
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(rooms, snapshots, Arc::new(SystemClock), notify.clone())?);

    info!("roombook started");
    info!("  snapshot: {}", config.snapshot_path().display());
    info!("  rooms: {}", engine.room_ids().len());
    info!("  tick: {:?}", config.tick);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let scheduler = Arc::new(Scheduler::new(engine.clone()));
    let scheduler_task = tokio::spawn(run_scheduler(scheduler, config.tick));

    let mut events = notify.subscribe_all();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::StatusChanged { .. }) => {}
                Ok(event) => tracing::debug!("event: {event:?}"),
                Err(RecvError::Lagged(n)) => tracing::warn!("event log lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Graceful shutdown on SIGTERM/ctrl-c: stop the scheduler, then persist.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received");

    scheduler_task.abort();
    event_log.abort();
    if let Err(e) = engine.flush().await {
        tracing::error!("final snapshot failed: {e}");
    }

    info!("roombook stopped");
    Ok(())
}
