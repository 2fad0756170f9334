use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::error::Missing;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// Rooms plus a booking-id → room-id index. Booking mutations take the
/// room's state by `&mut`, so the caller must hold that room's write lock.
pub struct RoomStore {
    rooms: DashMap<Ulid, SharedRoomState>,
    booking_to_room: DashMap<BookingId, Ulid>,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            booking_to_room: DashMap::new(),
        }
    }

    // ── Room CRUD ────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains_room(&self, id: &Ulid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room(&self, id: &Ulid) -> Result<SharedRoomState, EngineError> {
        self.get_room(id).ok_or(EngineError::NotFound(Missing::Room(*id)))
    }

    /// Insert a room together with its bookings' index entries.
    pub fn insert_room(&self, state: RoomState) -> Result<(), EngineError> {
        let id = state.id;
        match self.rooms.entry(id) {
            Entry::Occupied(_) => Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                for b in state.bookings.iter().filter(|b| !b.id.is_legacy()) {
                    self.booking_to_room.insert(b.id, id);
                }
                slot.insert(Arc::new(RwLock::new(state)));
                Ok(())
            }
        }
    }

    /// Remove a room and cascade its bookings out of the index. `room` is the
    /// locked state of the room being deleted.
    pub fn delete_room(&self, room: &RoomState) -> Result<(), EngineError> {
        if self.rooms.remove(&room.id).is_none() {
            return Err(EngineError::NotFound(Missing::Room(room.id)));
        }
        for b in &room.bookings {
            self.booking_to_room.remove(&b.id);
        }
        Ok(())
    }

    pub fn room_ids(&self) -> Vec<Ulid> {
        self.rooms.iter().map(|e| *e.key()).collect()
    }

    // ── Booking index ────────────────────────────────────────

    pub fn room_for_booking(&self, id: &BookingId) -> Option<Ulid> {
        self.booking_to_room.get(id).map(|e| *e.value())
    }

    // ── Booking mutations ────────────────────────────────────

    /// Append an admitted booking to the room.
    pub fn add_booking(&self, room: &mut RoomState, booking: Booking) {
        if !booking.id.is_legacy() {
            self.booking_to_room.insert(booking.id, room.id);
        }
        room.insert_booking(booking);
    }

    pub fn remove_booking(&self, room: &mut RoomState, id: BookingId) -> Result<Booking, EngineError> {
        let removed = room
            .remove_booking(id)
            .ok_or(EngineError::NotFound(Missing::Booking(id)))?;
        self.booking_to_room.remove(&id);
        Ok(removed)
    }
}

// ── Floor labels ─────────────────────────────────────────────────

/// `1` → `"1st floor"`, `12` → `"12th floor"`, `23` → `"23rd floor"`.
pub fn floor_label(n: u64) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix} floor")
}

/// Floor implied by the first number in a room name, hundreds being the floor
/// (`"Room 301"` → 3rd floor). Names without a number land on the 1st floor.
pub fn default_floor(name: &str) -> String {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let number: u64 = digits.parse().unwrap_or(100);
    floor_label((number / 100).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Ms = 1_700_000_000_000;

    fn room() -> RoomState {
        RoomState::new(Ulid::new(), "Room 101".into(), "1st floor".into(), String::new())
    }

    fn booking(id: BookingId) -> Booking {
        Booking {
            id,
            span: Span::new(T, T + 1_000),
            description: String::new(),
            booked_by: None,
            created_at: T,
        }
    }

    #[test]
    fn insert_room_indexes_bookings() {
        let store = RoomStore::new();
        let mut rs = room();
        let id = BookingId::generate();
        rs.insert_booking(booking(id));
        let rid = rs.id;
        store.insert_room(rs).unwrap();
        assert_eq!(store.room_for_booking(&id), Some(rid));
        assert_eq!(store.room_count(), 1);
    }

    #[test]
    fn duplicate_room_rejected() {
        let store = RoomStore::new();
        let rs = room();
        store.insert_room(rs.clone()).unwrap();
        assert_eq!(store.insert_room(rs.clone()), Err(EngineError::AlreadyExists(rs.id)));
    }

    #[test]
    fn add_and_remove_booking() {
        let store = RoomStore::new();
        let mut rs = room();
        let id = BookingId::generate();
        store.add_booking(&mut rs, booking(id));
        assert_eq!(store.room_for_booking(&id), Some(rs.id));

        let removed = store.remove_booking(&mut rs, id).unwrap();
        assert_eq!(removed.id, id);
        assert!(rs.bookings.is_empty());
        assert_eq!(store.room_for_booking(&id), None);

        assert_eq!(
            store.remove_booking(&mut rs, id),
            Err(EngineError::NotFound(Missing::Booking(id)))
        );
    }

    #[test]
    fn legacy_is_not_indexed() {
        let store = RoomStore::new();
        let mut rs = room();
        store.add_booking(&mut rs, booking(BookingId::Legacy));
        assert_eq!(store.room_for_booking(&BookingId::Legacy), None);
        assert!(rs.legacy().is_some());
    }

    #[test]
    fn delete_room_cascades_and_reports_missing() {
        let store = RoomStore::new();
        let mut rs = room();
        let id = BookingId::generate();
        rs.insert_booking(booking(id));
        store.insert_room(rs.clone()).unwrap();

        store.delete_room(&rs).unwrap();
        assert!(!store.contains_room(&rs.id));
        assert_eq!(store.room_for_booking(&id), None);

        assert_eq!(
            store.delete_room(&rs),
            Err(EngineError::NotFound(Missing::Room(rs.id)))
        );
    }

    #[test]
    fn floor_labels() {
        assert_eq!(floor_label(1), "1st floor");
        assert_eq!(floor_label(2), "2nd floor");
        assert_eq!(floor_label(3), "3rd floor");
        assert_eq!(floor_label(4), "4th floor");
        assert_eq!(floor_label(11), "11th floor");
        assert_eq!(floor_label(22), "22nd floor");
    }

    #[test]
    fn default_floor_from_name() {
        assert_eq!(default_floor("Room 301"), "3rd floor");
        assert_eq!(default_floor("Lab 1205-B"), "12th floor");
        assert_eq!(default_floor("Room 42"), "1st floor");
        assert_eq!(default_floor("Boardroom"), "1st floor");
    }
}
