use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::engine::floor_label;
use crate::limits::*;
use crate::model::*;

// ── Persisted shapes ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: BookingId,
    pub start_time: Ms,
    pub end_time: Ms,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub booked_by: Option<User>,
    #[serde(default)]
    pub created_at: Ms,
}

/// A room as stored. The bare `start_time`/`end_time`/`event_title`/`booked_by`
/// fields are the legacy single-booking form; they only mean something when
/// `bookings` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: Ulid,
    pub name: String,
    #[serde(default)]
    pub floor: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bookings: Vec<BookingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Ms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Ms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booked_by: Option<User>,
}

impl RoomRecord {
    /// Materialize into engine state. Legacy fields become one synthetic
    /// booking. Bookings that admission would have refused for their span,
    /// description or the per-room count are dropped, as are overlapping
    /// ones. The duration cap is not applied.
    pub fn into_state(self) -> RoomState {
        let mut rs = RoomState::new(self.id, self.name, self.floor, self.description);

        if self.bookings.is_empty()
            && let (Some(start), Some(end)) = (self.start_time, self.end_time)
        {
            match Span::try_new(start, end).filter(in_valid_range) {
                Some(span) => rs.insert_booking(Booking {
                    id: BookingId::Legacy,
                    span,
                    description: self.event_title.unwrap_or_default(),
                    booked_by: self.booked_by,
                    created_at: 0,
                }),
                None => warn!("room {}: dropping legacy event with invalid span", rs.id),
            }
        }

        let mut records = self.bookings;
        records.sort_by_key(|b| (b.created_at, b.id));
        for record in records {
            if rs.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
                warn!("room {}: booking limit reached, dropping the rest", rs.id);
                break;
            }
            let Some(span) = Span::try_new(record.start_time, record.end_time).filter(in_valid_range) else {
                warn!("room {}: dropping booking {} with invalid span", rs.id, record.id);
                continue;
            };
            if record.description.len() > MAX_DESCRIPTION_LEN {
                warn!("room {}: dropping booking {} with oversized description", rs.id, record.id);
                continue;
            }
            if record.id.is_legacy() || rs.booking(record.id).is_some() {
                warn!("room {}: dropping duplicate booking {}", rs.id, record.id);
                continue;
            }
            if let Some(existing) = rs.overlapping(&span).next() {
                warn!(
                    "room {}: dropping booking {} overlapping {}",
                    rs.id, record.id, existing.id
                );
                continue;
            }
            rs.insert_booking(Booking {
                id: record.id,
                span,
                description: record.description,
                booked_by: record.booked_by,
                created_at: record.created_at,
            });
        }
        rs
    }

    /// The legacy booking goes back to the bare fields, never into `bookings`.
    pub fn from_state(rs: &RoomState) -> Self {
        let legacy = rs.legacy();
        Self {
            id: rs.id,
            name: rs.name.clone(),
            floor: rs.floor.clone(),
            description: rs.description.clone(),
            bookings: rs
                .bookings
                .iter()
                .filter(|b| !b.id.is_legacy())
                .map(|b| BookingRecord {
                    id: b.id,
                    start_time: b.span.start,
                    end_time: b.span.end,
                    description: b.description.clone(),
                    booked_by: b.booked_by.clone(),
                    created_at: b.created_at,
                })
                .collect(),
            start_time: legacy.map(|b| b.span.start),
            end_time: legacy.map(|b| b.span.end),
            event_title: legacy.map(|b| b.description.clone()),
            booked_by: legacy.and_then(|b| b.booked_by.clone()),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SnapshotError {
    Io(io::Error),
    /// Stored data is unreadable: bad framing, checksum mismatch or bad JSON.
    Corrupt(String),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "snapshot I/O error: {e}"),
            SnapshotError::Corrupt(msg) => write!(f, "corrupt snapshot: {msg}"),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<io::Error> for SnapshotError {
    fn from(e: io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

// ── Framing ──────────────────────────────────────────────────────

/// Encode rooms as `[u32: len][json: rooms][u32: crc32]`.
pub fn encode_snapshot(rooms: &[RoomRecord]) -> io::Result<Vec<u8>> {
    let payload = serde_json::to_vec(rooms).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "snapshot too large"))?;
    let crc = crc32fast::hash(&payload);
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<Vec<RoomRecord>, SnapshotError> {
    if bytes.len() < 8 {
        return Err(SnapshotError::Corrupt("truncated header".into()));
    }
    let (len_buf, rest) = bytes.split_at(4);
    let len = u32::from_le_bytes([len_buf[0], len_buf[1], len_buf[2], len_buf[3]]) as usize;
    if rest.len() != len + 4 {
        return Err(SnapshotError::Corrupt(format!(
            "length mismatch: header says {len}, found {}",
            rest.len().saturating_sub(4)
        )));
    }
    let (payload, crc_buf) = rest.split_at(len);
    let stored_crc = u32::from_le_bytes([crc_buf[0], crc_buf[1], crc_buf[2], crc_buf[3]]);
    if stored_crc != crc32fast::hash(payload) {
        return Err(SnapshotError::Corrupt("checksum mismatch".into()));
    }
    serde_json::from_slice(payload).map_err(|e| SnapshotError::Corrupt(e.to_string()))
}

// ── Stores ───────────────────────────────────────────────────────

/// Whole-state snapshot persistence. `load` returns `Ok(None)` when nothing
/// has been saved yet.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<Vec<RoomRecord>>, SnapshotError>;
    fn save(&self, rooms: &[RoomRecord]) -> io::Result<()>;
}

/// Snapshot file replaced atomically on every save.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<Vec<RoomRecord>>, SnapshotError> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        decode_snapshot(&bytes).map(Some)
    }

    /// Write to a temp file, fsync, then rename over the snapshot.
    fn save(&self, rooms: &[RoomRecord]) -> io::Result<()> {
        let bytes = encode_snapshot(rooms)?;
        let tmp_path = self.path.with_extension("snap.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)
    }
}

/// In-process store holding the encoded bytes.
#[derive(Default)]
pub struct MemorySnapshotStore {
    bytes: Mutex<Option<Vec<u8>>>,
    saves: Mutex<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw stored bytes, e.g. to simulate a damaged blob.
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes)),
            saves: Mutex::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Vec<RoomRecord>>, SnapshotError> {
        let guard = self
            .bytes
            .lock()
            .map_err(|_| SnapshotError::Corrupt("store lock poisoned".into()))?;
        guard.as_deref().map(decode_snapshot).transpose()
    }

    fn save(&self, rooms: &[RoomRecord]) -> io::Result<()> {
        let bytes = encode_snapshot(rooms)?;
        let mut guard = self
            .bytes
            .lock()
            .map_err(|_| io::Error::other("store lock poisoned"))?;
        *guard = Some(bytes);
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Sample rooms `Room 101` … `Room {n}01`, one per floor.
pub fn sample_rooms(n: usize) -> Vec<RoomState> {
    (1..=n as u64)
        .map(|i| {
            RoomState::new(
                Ulid::new(),
                format!("Room {}", i * 100 + 1),
                floor_label(i),
                String::new(),
            )
        })
        .collect()
}

/// Turn stored records into engine state. Repeated room ids keep the first
/// record; a booking id already held by an earlier room is dropped.
fn materialize(records: Vec<RoomRecord>) -> Vec<RoomState> {
    let mut room_ids = HashSet::new();
    let mut booking_ids = HashSet::new();
    let mut rooms = Vec::with_capacity(records.len());
    for record in records {
        if rooms.len() >= MAX_ROOMS {
            warn!("room limit reached, dropping the rest of the snapshot");
            break;
        }
        if !room_ids.insert(record.id) {
            warn!("dropping duplicate room {}", record.id);
            continue;
        }
        let mut rs = record.into_state();
        let room_id = rs.id;
        rs.bookings.retain(|b| {
            let fresh = b.id.is_legacy() || booking_ids.insert(b.id);
            if !fresh {
                warn!("room {room_id}: dropping booking {} held by another room", b.id);
            }
            fresh
        });
        rooms.push(rs);
    }
    rooms
}

/// Load stored rooms. Missing data seeds sample rooms; unreadable data is
/// logged and also replaced by sample rooms rather than failing startup.
pub fn load_or_seed(store: &dyn SnapshotStore, seed_rooms: usize) -> Vec<RoomState> {
    match store.load() {
        Ok(Some(records)) => {
            let rooms = materialize(records);
            info!("loaded {} rooms from snapshot", rooms.len());
            rooms
        }
        Ok(None) => {
            info!("no snapshot found, seeding {seed_rooms} sample rooms");
            sample_rooms(seed_rooms)
        }
        Err(e) => {
            error!("{e}; falling back to {seed_rooms} sample rooms");
            sample_rooms(seed_rooms)
        }
    }
}
