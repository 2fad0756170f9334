use std::sync::Arc;

use tokio::sync::OwnedRwLockWriteGuard;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::admission::{Proposal, admit};
use super::cancellation::authorize_cancel;
use super::error::Missing;
use super::status::room_view;
use super::store::default_floor;
use super::{Engine, EngineError};

/// Partial room metadata update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomUpdate {
    pub name: Option<String>,
    pub floor: Option<String>,
    pub description: Option<String>,
}

/// Result of an instant booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantBooking {
    pub booking: Booking,
    /// The hour was cut short to end when the next booking starts.
    pub shortened: bool,
}

fn require_admin(is_admin: bool) -> Result<(), EngineError> {
    if is_admin { Ok(()) } else { Err(EngineError::NotAuthorized) }
}

fn validate_room_meta(name: &str, floor: &str, description: &str) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::InvalidInput("room name is required"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    if floor.len() > MAX_FLOOR_LEN {
        return Err(EngineError::LimitExceeded("floor too long"));
    }
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    Ok(())
}

impl Engine {
    /// Lookup room, acquire its write lock, and confirm it was not deleted
    /// (or deleted and re-created under the same id) while we waited.
    async fn room_write(&self, room_id: Ulid) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let rs = self.store.room(&room_id)?;
        let guard = rs.clone().write_owned().await;
        let still_current = self
            .store
            .get_room(&room_id)
            .is_some_and(|cur| Arc::ptr_eq(&cur, &rs));
        if !still_current {
            return Err(EngineError::NotFound(Missing::Room(room_id)));
        }
        Ok(guard)
    }

    // ── Room administration ──────────────────────────────────

    /// Create a room. An empty floor is derived from the name.
    pub async fn create_room(
        &self,
        id: Ulid,
        name: String,
        floor: String,
        description: String,
        is_admin: bool,
    ) -> Result<RoomInfo, EngineError> {
        let room_info = self
            .create_room_inner(id, name, floor, description, is_admin)
            .inspect_err(|e| self.rejected("create_room", e))?;
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(self.store.room_count() as f64);
        info!("room {id} created: {}", room_info.name);
        self.notify.send(&Event::RoomCreated {
            id,
            name: room_info.name.clone(),
        });
        self.mark_dirty();
        Ok(room_info)
    }

    fn create_room_inner(
        &self,
        id: Ulid,
        name: String,
        floor: String,
        description: String,
        is_admin: bool,
    ) -> Result<RoomInfo, EngineError> {
        require_admin(is_admin)?;
        let name = name.trim().to_string();
        let floor = match floor.trim() {
            "" => default_floor(&name),
            f => f.to_string(),
        };
        let description = description.trim().to_string();
        validate_room_meta(&name, &floor, &description)?;
        if self.store.room_count() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let rs = RoomState::new(id, name, floor, description);
        let room_info = rs.info();
        self.store.insert_room(rs)?;
        Ok(room_info)
    }

    pub async fn update_room(&self, id: Ulid, update: RoomUpdate, is_admin: bool) -> Result<RoomInfo, EngineError> {
        let room_info = self
            .update_room_inner(id, update, is_admin)
            .await
            .inspect_err(|e| self.rejected("update_room", e))?;
        info!("room {id} updated");
        self.notify.send(&Event::RoomUpdated { id });
        self.mark_dirty();
        Ok(room_info)
    }

    async fn update_room_inner(&self, id: Ulid, update: RoomUpdate, is_admin: bool) -> Result<RoomInfo, EngineError> {
        require_admin(is_admin)?;
        let mut guard = self.room_write(id).await?;

        let name = update
            .name
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| guard.name.clone());
        let floor = match update.floor.as_deref().map(str::trim) {
            Some("") => default_floor(&name),
            Some(f) => f.to_string(),
            None => guard.floor.clone(),
        };
        let description = update
            .description
            .map(|d| d.trim().to_string())
            .unwrap_or_else(|| guard.description.clone());
        validate_room_meta(&name, &floor, &description)?;

        guard.name = name;
        guard.floor = floor;
        guard.description = description;
        Ok(guard.info())
    }

    /// Remove a room and every booking in it.
    pub async fn delete_room(&self, id: Ulid, is_admin: bool) -> Result<RoomInfo, EngineError> {
        let room_info = self
            .delete_room_inner(id, is_admin)
            .await
            .inspect_err(|e| self.rejected("delete_room", e))?;
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(self.store.room_count() as f64);
        info!("room {id} deleted with {} bookings", room_info.booking_count);
        self.notify.send(&Event::RoomDeleted { id });
        self.notify.remove(&id);
        self.mark_dirty();
        Ok(room_info)
    }

    async fn delete_room_inner(&self, id: Ulid, is_admin: bool) -> Result<RoomInfo, EngineError> {
        require_admin(is_admin)?;
        let guard = self.room_write(id).await?;
        self.store.delete_room(&guard)?;
        Ok(guard.info())
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Admit and insert a booking as one step under the room's write lock.
    pub async fn try_book(&self, room_id: Ulid, proposal: Proposal, requester: &User) -> Result<Booking, EngineError> {
        let booking = self
            .try_book_inner(room_id, proposal, requester)
            .await
            .inspect_err(|e| self.rejected("book", e))?;
        self.admitted(room_id, &booking);
        Ok(booking)
    }

    async fn try_book_inner(&self, room_id: Ulid, proposal: Proposal, requester: &User) -> Result<Booking, EngineError> {
        let mut guard = self.room_write(room_id).await?;
        let booking = admit(&guard, proposal, requester, self.now())?;
        self.store.add_booking(&mut guard, booking.clone());
        Ok(booking)
    }

    /// Book the room for the next hour, or until the next booking starts if
    /// that comes sooner.
    pub async fn book_instant(&self, room_id: Ulid, requester: &User) -> Result<InstantBooking, EngineError> {
        let instant = self
            .book_instant_inner(room_id, requester)
            .await
            .inspect_err(|e| self.rejected("book_instant", e))?;
        self.admitted(room_id, &instant.booking);
        Ok(instant)
    }

    async fn book_instant_inner(&self, room_id: Ulid, requester: &User) -> Result<InstantBooking, EngineError> {
        let mut guard = self.room_write(room_id).await?;
        let now = self.now();
        let (proposal, shortened) =
            Proposal::new(now, now + INSTANT_BOOKING_MS, String::new()).fit_before_next(&guard);
        let booking = admit(&guard, proposal, requester, now)?;
        self.store.add_booking(&mut guard, booking.clone());
        Ok(InstantBooking { booking, shortened })
    }

    fn admitted(&self, room_id: Ulid, booking: &Booking) {
        metrics::counter!(crate::observability::BOOKINGS_ADMITTED_TOTAL).increment(1);
        info!(
            "booking {} admitted in room {room_id} [{}, {})",
            booking.id, booking.span.start, booking.span.end
        );
        self.notify.send(&Event::BookingAdmitted {
            id: booking.id,
            room_id,
            span: booking.span,
        });
        self.mark_dirty();
    }

    /// Cancel a booking. Returns the room's display state afterwards.
    pub async fn try_cancel(
        &self,
        room_id: Ulid,
        booking_id: BookingId,
        requester: &User,
        is_admin: bool,
    ) -> Result<RoomView, EngineError> {
        let view = self
            .try_cancel_inner(room_id, booking_id, requester, is_admin)
            .await
            .inspect_err(|e| self.rejected("cancel", e))?;
        metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!("booking {booking_id} in room {room_id} cancelled by {}", requester.id);
        self.notify.send(&Event::BookingCancelled { id: booking_id, room_id });
        self.mark_dirty();
        Ok(view)
    }

    async fn try_cancel_inner(
        &self,
        room_id: Ulid,
        booking_id: BookingId,
        requester: &User,
        is_admin: bool,
    ) -> Result<RoomView, EngineError> {
        let mut guard = self.room_write(room_id).await?;
        authorize_cancel(&guard, booking_id, requester, is_admin)?;
        self.store.remove_booking(&mut guard, booking_id)?;
        Ok(room_view(&guard, self.now()))
    }

    // ── Legacy shim administration ───────────────────────────

    /// Drop the room's synthetic legacy booking.
    pub async fn clear_legacy(&self, room_id: Ulid, is_admin: bool) -> Result<Booking, EngineError> {
        let removed = self
            .clear_legacy_inner(room_id, is_admin)
            .await
            .inspect_err(|e| self.rejected("clear_legacy", e))?;
        info!("legacy event cleared from room {room_id}");
        self.notify.send(&Event::LegacyCleared { room_id });
        self.mark_dirty();
        Ok(removed)
    }

    async fn clear_legacy_inner(&self, room_id: Ulid, is_admin: bool) -> Result<Booking, EngineError> {
        require_admin(is_admin)?;
        let mut guard = self.room_write(room_id).await?;
        self.store.remove_booking(&mut guard, BookingId::Legacy)
    }

    /// Turn the legacy booking into an ordinary one with a fresh id. Its span,
    /// description and booker are kept.
    pub async fn promote_legacy(&self, room_id: Ulid, is_admin: bool) -> Result<Booking, EngineError> {
        let promoted = self
            .promote_legacy_inner(room_id, is_admin)
            .await
            .inspect_err(|e| self.rejected("promote_legacy", e))?;
        info!("legacy event in room {room_id} promoted to booking {}", promoted.id);
        self.notify.send(&Event::LegacyPromoted { id: promoted.id, room_id });
        self.mark_dirty();
        Ok(promoted)
    }

    async fn promote_legacy_inner(&self, room_id: Ulid, is_admin: bool) -> Result<Booking, EngineError> {
        require_admin(is_admin)?;
        let mut guard = self.room_write(room_id).await?;
        let legacy = self.store.remove_booking(&mut guard, BookingId::Legacy)?;
        let promoted = Booking {
            id: BookingId::generate(),
            created_at: self.now(),
            ..legacy
        };
        self.store.add_booking(&mut guard, promoted.clone());
        Ok(promoted)
    }
}
