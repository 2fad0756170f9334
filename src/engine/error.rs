use ulid::Ulid;

use crate::model::{BookingId, Span};

/// What a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Room(Ulid),
    Booking(BookingId),
}

/// Expected, recoverable outcomes of booking and room operations.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Unparseable, out-of-range or non-positive-duration input.
    InvalidTime,
    /// Longer than the booking cap; carries the requested duration.
    TooLong { hours: f64 },
    /// Overlaps an existing booking.
    Conflict { booking: BookingId, span: Span },
    NotFound(Missing),
    NotAuthorized,
    /// The synthetic legacy booking cannot be cancelled like a real one.
    LegacyBooking,
    AlreadyExists(Ulid),
    /// Missing or malformed room metadata.
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
}

impl EngineError {
    /// Short stable label, used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::InvalidTime => "invalid_time",
            EngineError::TooLong { .. } => "too_long",
            EngineError::Conflict { .. } => "conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::NotAuthorized => "not_authorized",
            EngineError::LegacyBooking => "legacy_booking",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidTime => {
                write!(f, "invalid time: end must be after start (use HH:MM)")
            }
            EngineError::TooLong { hours } => {
                write!(f, "booking of {hours:.2}h exceeds the 4 hour maximum")
            }
            EngineError::Conflict { booking, span } => write!(
                f,
                "unavailable: overlaps booking {booking} [{}, {})",
                span.start, span.end
            ),
            EngineError::NotFound(Missing::Room(id)) => write!(f, "room not found: {id}"),
            EngineError::NotFound(Missing::Booking(id)) => write!(f, "booking not found: {id}"),
            EngineError::NotAuthorized => {
                write!(f, "not authorized: only the booking owner or an admin may do this")
            }
            EngineError::LegacyBooking => {
                write!(f, "legacy booking: clear the room's legacy event instead")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
