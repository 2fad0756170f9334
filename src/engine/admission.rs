use chrono::{NaiveDate, TimeZone};

use crate::limits::*;
use crate::model::*;
use crate::timeparse::{Meridiem, clock_face_time, span_on_date};

use super::EngineError;

/// A requested booking before validation. Times are raw; admission decides
/// whether they are well formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub start: Ms,
    pub end: Ms,
    pub description: String,
}

impl Proposal {
    pub fn new(start: Ms, end: Ms, description: impl Into<String>) -> Self {
        Self {
            start,
            end,
            description: description.into(),
        }
    }

    /// Build from a date and two 12-hour clock strings. An end time of day at
    /// or before the start lands on the next day.
    pub fn from_clock_face<Tz: TimeZone>(
        date: NaiveDate,
        start: (&str, Meridiem),
        end: (&str, Meridiem),
        description: impl Into<String>,
        tz: &Tz,
    ) -> Result<Self, EngineError> {
        let start = clock_face_time(start.0, start.1).ok_or(EngineError::InvalidTime)?;
        let end = clock_face_time(end.0, end.1).ok_or(EngineError::InvalidTime)?;
        let span = span_on_date(date, start, end, tz).ok_or(EngineError::InvalidTime)?;
        Ok(Self::new(span.start, span.end, description))
    }

    /// Shorten the proposal so it ends when the next booking after its start
    /// begins. Returns whether anything changed. Conflict rules are left to
    /// admission.
    pub fn fit_before_next(mut self, room: &RoomState) -> (Self, bool) {
        let next_start = room
            .bookings
            .iter()
            .map(|b| b.span.start)
            .filter(|&s| s > self.start && s < self.end)
            .min();
        match next_start {
            Some(s) => {
                self.end = s;
                (self, true)
            }
            None => (self, false),
        }
    }
}

/// Validate a proposal against a room, first failing rule wins:
/// well-formed time, duration cap, guard limits, then conflict with every
/// existing booking (legacy included). On success the booking is stamped
/// with a fresh id, `created_at = now` and the requester.
pub fn admit(
    room: &RoomState,
    proposal: Proposal,
    requester: &User,
    now: Ms,
) -> Result<Booking, EngineError> {
    let span = Span::try_new(proposal.start, proposal.end).ok_or(EngineError::InvalidTime)?;
    if !in_valid_range(&span) {
        return Err(EngineError::InvalidTime);
    }

    if span.duration_ms() > MAX_BOOKING_DURATION_MS {
        return Err(EngineError::TooLong {
            hours: span.duration_hours(),
        });
    }

    let description = proposal.description.trim().to_string();
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    if room.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
        return Err(EngineError::LimitExceeded("too many bookings on room"));
    }

    if let Some(existing) = room.overlapping(&span).next() {
        return Err(EngineError::Conflict {
            booking: existing.id,
            span: existing.span,
        });
    }

    Ok(Booking {
        id: BookingId::generate(),
        span,
        description,
        booked_by: Some(requester.clone()),
        created_at: now,
    })
}
