use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ulid::Ulid;

use roombook::clock::SystemClock;
use roombook::engine::{Engine, EngineError, Proposal};
use roombook::model::*;
use roombook::notify::NotifyHub;
use roombook::scheduler::Scheduler;
use roombook::snapshot::{MemorySnapshotStore, sample_rooms};

const HOUR: i64 = 3_600_000; // 1 hour in ms
const BASE: i64 = 1_800_000_000_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: n=0");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn user(i: usize) -> User {
    User::new(format!("u{i}"), format!("User {i}"))
}

async fn phase1_sequential(engine: &Engine, rid: Ulid) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = BASE + (i as i64) * HOUR;
        let t = Instant::now();
        if let Err(e) = engine.try_book(rid, Proposal::new(s, s + HOUR, ""), &user(0)).await {
            println!("  unexpected rejection: {e}");
        }
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("admission latency", &mut latencies);
}

/// Many tasks race for the same overlapping slots on one room.
async fn phase2_contention(engine: Arc<Engine>, rid: Ulid) {
    let n_tasks = 32;
    let n_per_task = 100;
    let start = Instant::now();
    let mut handles = Vec::new();

    for task in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let (mut admitted, mut conflicts) = (0usize, 0usize);
            for j in 0..n_per_task {
                // Half-hour stagger: neighbouring proposals overlap.
                let s = BASE + 10_000 * HOUR + (j as i64) * HOUR / 2;
                match engine.try_book(rid, Proposal::new(s, s + HOUR, ""), &user(task)).await {
                    Ok(_) => admitted += 1,
                    Err(EngineError::Conflict { .. }) => conflicts += 1,
                    Err(e) => println!("  unexpected rejection: {e}"),
                }
            }
            (admitted, conflicts)
        }));
    }

    let (mut admitted, mut conflicts) = (0, 0);
    for h in futures::future::join_all(handles).await {
        if let Ok((a, c)) = h {
            admitted += a;
            conflicts += c;
        }
    }

    let elapsed = start.elapsed();
    println!(
        "  {n_tasks} tasks x {n_per_task} proposals: {admitted} admitted, {conflicts} conflicts in {:.2}s",
        elapsed.as_secs_f64()
    );
}

/// Scheduler passes while writers keep booking other rooms.
async fn phase3_tick_under_load(engine: Arc<Engine>) {
    let stop = Arc::new(AtomicBool::new(false));
    let rooms = engine.room_ids();
    let mut writers = Vec::new();
    for (w, rid) in rooms.iter().copied().enumerate().skip(2) {
        let engine = engine.clone();
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let s = BASE + i * HOUR;
                let _ = engine.try_book(rid, Proposal::new(s, s + HOUR, ""), &user(w)).await;
                i += 1;
            }
        }));
    }

    let scheduler = Scheduler::new(engine.clone());
    let mut latencies = Vec::with_capacity(500);
    for _ in 0..500 {
        let t = Instant::now();
        scheduler.tick().await;
        latencies.push(t.elapsed());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("scheduler tick", &mut latencies);
}

async fn verify_no_overlap(engine: &Engine) -> bool {
    let mut ok = true;
    for room in engine.snapshot().await {
        for pair in room.bookings.windows(2) {
            if pair[0].span.overlaps(&pair[1].span) {
                println!("  OVERLAP in {}: {:?} / {:?}", room.name, pair[0].span, pair[1].span);
                ok = false;
            }
        }
    }
    ok
}

#[tokio::main]
async fn main() {
    println!("=== roombook stress benchmark ===\n");

    let engine = Arc::new(
        Engine::new(
            sample_rooms(8),
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(SystemClock),
            Arc::new(NotifyHub::new()),
        )
        .expect("engine"),
    );
    let rooms = engine.room_ids();

    println!("[phase 1] sequential admission throughput");
    phase1_sequential(&engine, rooms[0]).await;

    println!("\n[phase 2] concurrent admission on one room");
    phase2_contention(engine.clone(), rooms[1]).await;

    println!("\n[phase 3] scheduler tick under write load");
    phase3_tick_under_load(engine.clone()).await;

    println!("\n[verify] no-overlap invariant");
    if verify_no_overlap(&engine).await {
        println!("  ok");
    } else {
        std::process::exit(1);
    }

    println!("\n=== done ===");
}
