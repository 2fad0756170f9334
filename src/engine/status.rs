use std::cmp::Ordering;

use crate::limits::{FREE_TITLE, UPCOMING_WINDOW_MS};
use crate::model::*;

// ── Status Derivation ─────────────────────────────────────────────

/// Result of deriving a room's status at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived<'a> {
    pub status: RoomStatus,
    pub active: Option<&'a Booking>,
    pub next: Option<&'a Booking>,
}

/// Earliest start, then earliest creation, then id.
fn schedule_order(a: &Booking, b: &Booking) -> Ordering {
    a.span
        .start
        .cmp(&b.span.start)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

/// Pure function of `(bookings, now)`; input order does not matter.
///
/// - active: the booking containing `now` (half-open, so one ending at `now` is over)
/// - next: the earliest booking starting after `now`
/// - Occupied if active, Upcoming if next starts within the window (inclusive),
///   else Available
pub fn derive_status(bookings: &[Booking], now: Ms) -> Derived<'_> {
    let active = bookings
        .iter()
        .filter(|b| b.span.contains_instant(now))
        .min_by(|a, b| schedule_order(a, b));
    let next = bookings
        .iter()
        .filter(|b| b.span.start > now)
        .min_by(|a, b| schedule_order(a, b));

    let status = match (active, next) {
        (Some(_), _) => RoomStatus::Occupied,
        (None, Some(n)) if n.span.start - now <= UPCOMING_WINDOW_MS => RoomStatus::Upcoming,
        _ => RoomStatus::Available,
    };

    Derived { status, active, next }
}

/// Display state for a room: title and window come from the active booking,
/// else from the next one while it is inside the Upcoming window.
pub fn room_view(room: &RoomState, now: Ms) -> RoomView {
    let derived = derive_status(&room.bookings, now);
    let shown = match derived.status {
        RoomStatus::Occupied => derived.active,
        RoomStatus::Upcoming => derived.next,
        RoomStatus::Available => None,
    };
    let title = match shown {
        Some(b) => b
            .title()
            .unwrap_or(match derived.status {
                RoomStatus::Occupied => "Booked",
                _ => "Upcoming",
            })
            .to_string(),
        None => FREE_TITLE.to_string(),
    };
    RoomView {
        room_id: room.id,
        name: room.name.clone(),
        floor: room.floor.clone(),
        status: derived.status,
        title,
        shown: shown.map(|b| b.id),
        window: shown.map(|b| b.span),
    }
}

/// The first instant after `now` at which `derive_status` can change:
/// an active booking ending, a future booking entering the Upcoming window,
/// or a future booking starting.
pub fn next_transition(bookings: &[Booking], now: Ms) -> Option<Ms> {
    bookings
        .iter()
        .flat_map(|b| {
            [
                b.span.start - UPCOMING_WINDOW_MS,
                b.span.start,
                b.span.end,
            ]
        })
        .filter(|&t| t > now)
        .min()
}
