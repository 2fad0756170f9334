use crate::model::*;

use super::EngineError;
use super::error::Missing;

/// Decide whether `requester` may cancel booking `id` in `room`.
///
/// Order: the booking must exist, the requester must be an admin or the
/// owner, and the synthetic legacy booking is refused even then.
pub fn authorize_cancel<'a>(
    room: &'a RoomState,
    id: BookingId,
    requester: &User,
    is_admin: bool,
) -> Result<&'a Booking, EngineError> {
    let booking = room
        .booking(id)
        .ok_or(EngineError::NotFound(Missing::Booking(id)))?;
    if !is_admin && !booking.is_owned_by(requester) {
        return Err(EngineError::NotAuthorized);
    }
    if booking.id.is_legacy() {
        return Err(EngineError::LegacyBooking);
    }
    Ok(booking)
}
