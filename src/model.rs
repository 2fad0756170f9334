use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` for empty or inverted input.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_ms() as f64 / crate::limits::HOUR_MS as f64
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Opaque identity supplied by the session layer. Only `id` takes part in
/// ownership checks; `display_name` is for titles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

const LEGACY_TAG: &str = "__legacy__";

/// Booking identifier. `Legacy` marks the synthetic booking materialized from
/// a room's bare start/end fields; it is never issued by admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BookingId {
    Legacy,
    Issued(Ulid),
}

impl BookingId {
    pub fn generate() -> Self {
        BookingId::Issued(Ulid::new())
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, BookingId::Legacy)
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingId::Legacy => f.write_str(LEGACY_TAG),
            BookingId::Issued(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for BookingId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == LEGACY_TAG {
            return Ok(BookingId::Legacy);
        }
        Ulid::from_string(s).map(BookingId::Issued)
    }
}

impl TryFrom<String> for BookingId {
    type Error = ulid::DecodeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BookingId> for String {
    fn from(id: BookingId) -> Self {
        id.to_string()
    }
}

/// An admitted reservation. Never mutated after creation; cancellation removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub span: Span,
    pub description: String,
    pub booked_by: Option<User>,
    pub created_at: Ms,
}

impl Booking {
    /// Description, else the booker's name.
    pub fn title(&self) -> Option<&str> {
        if !self.description.is_empty() {
            return Some(&self.description);
        }
        self.booked_by
            .as_ref()
            .map(|u| u.display_name.as_str())
            .filter(|n| !n.is_empty())
    }

    pub fn is_owned_by(&self, user: &User) -> bool {
        self.booked_by.as_ref().is_some_and(|u| u.id == user.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Upcoming,
    Occupied,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "Available",
            RoomStatus::Upcoming => "Upcoming",
            RoomStatus::Occupied => "Occupied",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "available" => Ok(RoomStatus::Available),
            "upcoming" => Ok(RoomStatus::Upcoming),
            "occupied" => Ok(RoomStatus::Occupied),
            other => Err(format!("unknown room status: {other}")),
        }
    }
}

/// Authoritative room state: metadata plus the booking set, sorted by `span.start`.
/// Status is never stored here; it is derived from `bookings` and the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    pub id: Ulid,
    pub name: String,
    pub floor: String,
    pub description: String,
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, name: String, floor: String, description: String) -> Self {
        Self {
            id,
            name,
            floor,
            description,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove booking by id.
    pub fn remove_booking(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn legacy(&self) -> Option<&Booking> {
        self.booking(BookingId::Legacy)
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
            floor: self.floor.clone(),
            description: self.description.clone(),
            booking_count: self.bookings.len(),
            has_legacy: self.legacy().is_some(),
        }
    }
}

/// Room-level notifications: mutations plus published status transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: String,
    },
    RoomUpdated {
        id: Ulid,
    },
    RoomDeleted {
        id: Ulid,
    },
    BookingAdmitted {
        id: BookingId,
        room_id: Ulid,
        span: Span,
    },
    BookingCancelled {
        id: BookingId,
        room_id: Ulid,
    },
    LegacyCleared {
        room_id: Ulid,
    },
    LegacyPromoted {
        id: BookingId,
        room_id: Ulid,
    },
    StatusChanged {
        view: RoomView,
    },
}

impl Event {
    pub fn room_id(&self) -> Ulid {
        match self {
            Event::RoomCreated { id, .. } | Event::RoomUpdated { id } | Event::RoomDeleted { id } => *id,
            Event::BookingAdmitted { room_id, .. }
            | Event::BookingCancelled { room_id, .. }
            | Event::LegacyCleared { room_id }
            | Event::LegacyPromoted { room_id, .. } => *room_id,
            Event::StatusChanged { view } => view.room_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: String,
    pub floor: String,
    pub description: String,
    pub booking_count: usize,
    pub has_legacy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: BookingId,
    pub room_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub description: String,
    pub booked_by: Option<User>,
    pub created_at: Ms,
}

/// What a presentation layer renders for a room at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    pub room_id: Ulid,
    pub name: String,
    pub floor: String,
    pub status: RoomStatus,
    pub title: String,
    /// The booking the title and window came from, if any.
    pub shown: Option<BookingId>,
    pub window: Option<Span>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: Ms, end: Ms) -> Booking {
        Booking {
            id: BookingId::generate(),
            span: Span::new(start, end),
            description: String::new(),
            booked_by: None,
            created_at: 0,
        }
    }

    fn room() -> RoomState {
        RoomState::new(Ulid::new(), "Room 101".into(), "1st floor".into(), String::new())
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_try_new_rejects_empty_and_inverted() {
        assert!(Span::try_new(5, 5).is_none());
        assert!(Span::try_new(6, 5).is_none());
        assert_eq!(Span::try_new(5, 6), Some(Span::new(5, 6)));
    }

    #[test]
    fn span_duration_hours() {
        let s = Span::new(0, 90 * 60_000);
        assert!((s.duration_hours() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn booking_id_string_form() {
        assert_eq!(BookingId::Legacy.to_string(), "__legacy__");
        assert_eq!("__legacy__".parse::<BookingId>().unwrap(), BookingId::Legacy);

        let id = BookingId::generate();
        assert_eq!(id.to_string().parse::<BookingId>().unwrap(), id);
        assert!("not-a-ulid".parse::<BookingId>().is_err());
    }

    #[test]
    fn booking_id_serde_as_string() {
        let json = serde_json::to_string(&BookingId::Legacy).unwrap();
        assert_eq!(json, "\"__legacy__\"");
        let back: BookingId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BookingId::Legacy);
    }

    #[test]
    fn booking_title_prefers_description() {
        let mut b = booking(0, 10);
        assert_eq!(b.title(), None);
        b.booked_by = Some(User::new("u1", "Ana"));
        assert_eq!(b.title(), Some("Ana"));
        b.description = "Standup".into();
        assert_eq!(b.title(), Some("Standup"));
    }

    #[test]
    fn ownership_compares_ids_only() {
        let mut b = booking(0, 10);
        b.booked_by = Some(User::new("u1", "Ana"));
        assert!(b.is_owned_by(&User::new("u1", "someone else")));
        assert!(!b.is_owned_by(&User::new("u2", "Ana")));
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!("occupied".parse::<RoomStatus>().unwrap(), RoomStatus::Occupied);
        assert_eq!("Upcoming".parse::<RoomStatus>().unwrap(), RoomStatus::Upcoming);
        assert!("busy".parse::<RoomStatus>().is_err());
    }

    #[test]
    fn booking_ordering() {
        let mut rs = room();
        rs.insert_booking(booking(300, 400));
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(200, 300));
        assert_eq!(rs.bookings[0].span.start, 100);
        assert_eq!(rs.bookings[1].span.start, 200);
        assert_eq!(rs.bookings[2].span.start, 300);
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut rs = room();
        rs.insert_booking(booking(100, 200));
        assert!(rs.remove_booking(BookingId::generate()).is_none());
        assert_eq!(rs.bookings.len(), 1);
    }

    #[test]
    fn remove_middle_preserves_order() {
        let mut rs = room();
        let bookings: Vec<Booking> = (0..3).map(|i| booking(i * 100, i * 100 + 50)).collect();
        let ids: Vec<BookingId> = bookings.iter().map(|b| b.id).collect();
        for b in bookings {
            rs.insert_booking(b);
        }
        rs.remove_booking(ids[1]);
        assert_eq!(rs.bookings.len(), 2);
        assert_eq!(rs.bookings[0].id, ids[0]);
        assert_eq!(rs.bookings[1].id, ids[2]);
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut rs = room();
        rs.insert_booking(booking(100, 200));
        let hits: Vec<_> = rs.overlapping(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = room();
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(450, 600));
        rs.insert_booking(booking(1000, 1100));
        let hits: Vec<_> = rs.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_single_ms_overlap() {
        let mut rs = room();
        rs.insert_booking(booking(100, 201));
        assert_eq!(rs.overlapping(&Span::new(200, 300)).count(), 1);
    }
}
