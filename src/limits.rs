use crate::model::{Ms, Span};

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

// ── Booking policy ───────────────────────────────────────────────

/// Longest admissible booking.
pub const MAX_BOOKING_DURATION_MS: Ms = 4 * HOUR_MS;

/// Lookahead within which a future booking makes a room `Upcoming`. Inclusive.
pub const UPCOMING_WINDOW_MS: Ms = 30 * MINUTE_MS;

/// Length of an instant ("use now") booking before any fit-before-next trim.
pub const INSTANT_BOOKING_MS: Ms = HOUR_MS;

/// Title shown when a room has nothing active or about to start.
pub const FREE_TITLE: &str = "Free for bookings";

// ── Guard limits ─────────────────────────────────────────────────

pub const MAX_ROOMS: usize = 1_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_FLOOR_LEN: usize = 64;
pub const MAX_DESCRIPTION_LEN: usize = 1_024;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// Both ends fall inside the accepted timestamp range.
pub fn in_valid_range(span: &Span) -> bool {
    span.start >= MIN_VALID_TIMESTAMP_MS && span.end <= MAX_VALID_TIMESTAMP_MS
}
