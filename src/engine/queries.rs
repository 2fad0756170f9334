use ulid::Ulid;

use crate::model::*;
use crate::timeparse::format_remaining;

use super::error::Missing;
use super::status::room_view;
use super::{Engine, EngineError};

fn booking_info(room_id: Ulid, b: &Booking) -> BookingInfo {
    BookingInfo {
        id: b.id,
        room_id,
        start: b.span.start,
        end: b.span.end,
        description: b.description.clone(),
        booked_by: b.booked_by.clone(),
        created_at: b.created_at,
    }
}

/// Case-insensitive substring match on name, floor and description.
fn matches_query(room: &RoomState, needle: &str) -> bool {
    needle.is_empty()
        || [&room.name, &room.floor, &room.description]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
}

impl Engine {
    /// All rooms, sorted by name.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut result = Vec::new();
        for id in self.store.room_ids() {
            if let Some(rs) = self.store.get_room(&id) {
                result.push(rs.read().await.info());
            }
        }
        result.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        result
    }

    pub async fn room_info(&self, id: Ulid) -> Result<RoomInfo, EngineError> {
        let rs = self.store.room(&id)?;
        let guard = rs.read().await;
        Ok(guard.info())
    }

    /// Bookings of a room sorted by start.
    pub async fn bookings(&self, room_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let rs = self.store.room(&room_id)?;
        let guard = rs.read().await;
        Ok(guard.bookings.iter().map(|b| booking_info(room_id, b)).collect())
    }

    /// Find an issued booking anywhere via the booking index.
    pub async fn get_booking(&self, id: BookingId) -> Result<BookingInfo, EngineError> {
        let not_found = EngineError::NotFound(Missing::Booking(id));
        let room_id = self.store.room_for_booking(&id).ok_or(not_found.clone())?;
        let rs = self.store.get_room(&room_id).ok_or(not_found.clone())?;
        let guard = rs.read().await;
        guard
            .booking(id)
            .map(|b| booking_info(room_id, b))
            .ok_or(not_found)
    }

    /// Display state of one room at the engine's current time.
    pub async fn room_view(&self, id: Ulid) -> Result<RoomView, EngineError> {
        let rs = self.store.room(&id)?;
        let guard = rs.read().await;
        Ok(room_view(&guard, self.now()))
    }

    /// Display state of every room at `now`, sorted by name.
    pub async fn room_views_at(&self, now: Ms) -> Vec<RoomView> {
        let mut views = Vec::new();
        for id in self.store.room_ids() {
            if let Some(rs) = self.store.get_room(&id) {
                views.push(room_view(&*rs.read().await, now));
            }
        }
        views.sort_by(|a, b| a.name.cmp(&b.name).then(a.room_id.cmp(&b.room_id)));
        views
    }

    pub async fn room_views(&self) -> Vec<RoomView> {
        self.room_views_at(self.now()).await
    }

    /// Rooms whose name, floor or description contains `query`
    /// (case-insensitive), optionally restricted to one derived status.
    pub async fn search(&self, query: &str, status: Option<RoomStatus>) -> Vec<RoomView> {
        let needle = query.trim().to_lowercase();
        let now = self.now();
        let mut views = Vec::new();
        for id in self.store.room_ids() {
            let Some(rs) = self.store.get_room(&id) else {
                continue;
            };
            let guard = rs.read().await;
            if !matches_query(&guard, &needle) {
                continue;
            }
            let view = room_view(&guard, now);
            if status.is_none_or(|s| s == view.status) {
                views.push(view);
            }
        }
        views.sort_by(|a, b| a.name.cmp(&b.name).then(a.room_id.cmp(&b.room_id)));
        views
    }

    /// Countdown for an occupied room's active booking; `None` when the room
    /// is not occupied.
    pub async fn remaining(&self, room_id: Ulid) -> Result<Option<String>, EngineError> {
        let rs = self.store.room(&room_id)?;
        let guard = rs.read().await;
        let now = self.now();
        let view = room_view(&guard, now);
        Ok(match (view.status, view.window) {
            (RoomStatus::Occupied, Some(window)) => Some(format_remaining(window.end, now)),
            _ => None,
        })
    }
}
