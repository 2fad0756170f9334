use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const SNAPSHOT_FILE: &str = "rooms_v1.snap";

/// Daemon settings, read from `ROOMBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Longest the scheduler sleeps between passes.
    pub tick: Duration,
    pub metrics_port: Option<u16>,
    /// Sample rooms created when there is no usable snapshot.
    pub seed_rooms: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            tick: Duration::from_millis(1000),
            metrics_port: None,
            seed_rooms: 8,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let tick_ms = parse_or(lookup("ROOMBOOK_TICK_MS"), 1000u64).max(1);
        Self {
            data_dir: lookup("ROOMBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            tick: Duration::from_millis(tick_ms),
            metrics_port: lookup("ROOMBOOK_METRICS_PORT").and_then(|p| p.parse().ok()),
            seed_rooms: parse_or(lookup("ROOMBOOK_SEED_ROOMS"), defaults.seed_rooms),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }
}
