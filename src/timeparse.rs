//! Clock-face input handling: 12-hour strings to 24-hour times, overnight
//! spans, and the countdown text shown for occupied rooms.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, TimeZone};

use crate::limits::DAY_MS;
use crate::model::{Ms, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    Am,
    Pm,
}

impl FromStr for Meridiem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AM" => Ok(Meridiem::Am),
            "PM" => Ok(Meridiem::Pm),
            other => Err(format!("unknown meridiem: {other}")),
        }
    }
}

/// Split `"2:30"`, `"02:30"`, `"0230"` or a bare hour `"2"` into numbers.
fn split_hour_minute(input: &str) -> Option<(u32, u32)> {
    let s = input.trim();
    let (h, m) = match s.split_once(':') {
        Some((h, m)) => (h, m),
        None if s.len() == 4 => s.split_at(2),
        None if !s.is_empty() && s.len() <= 2 => (s, "0"),
        None => return None,
    };
    let h = h.trim();
    let m = m.trim();
    if h.is_empty() || m.is_empty() {
        return None;
    }
    if !h.bytes().all(|b| b.is_ascii_digit()) || !m.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((h.parse().ok()?, m.parse().ok()?))
}

/// Interpret clock-face input with its meridiem. `None` when unparseable or
/// out of range.
pub fn clock_face_time(input: &str, meridiem: Meridiem) -> Option<NaiveTime> {
    let (mut h, m) = split_hour_minute(input)?;
    match meridiem {
        Meridiem::Am if h == 12 => h = 0,
        Meridiem::Pm if h < 12 => h += 12,
        _ => {}
    }
    NaiveTime::from_hms_opt(h, m, 0)
}

/// `"2:30" PM` → `"14:30"`. `None` marks invalid input.
pub fn to_24_hour(input: &str, meridiem: Meridiem) -> Option<String> {
    clock_face_time(input, meridiem).map(|t| t.format("%H:%M").to_string())
}

/// An end at or before the start means the booking runs past midnight.
pub fn ends_next_day<T: PartialOrd>(start: &T, end: &T) -> bool {
    end <= start
}

/// An end at or before the start is read as the same clock time on the next day.
pub fn normalize_overnight(start: Ms, end: Ms) -> Ms {
    if ends_next_day(&start, &end) { end + DAY_MS } else { end }
}

/// Place two times of day on `date` in `tz`. The overnight rule is the one
/// `normalize_overnight` applies, but it moves `end` to the following calendar
/// day rather than adding 24 hours, so a DST change that night is honoured.
pub fn span_on_date<Tz: TimeZone>(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    tz: &Tz,
) -> Option<Span> {
    let end_date = if ends_next_day(&start, &end) { date.succ_opt()? } else { date };
    let start = date
        .and_time(start)
        .and_local_timezone(tz.clone())
        .earliest()?
        .timestamp_millis();
    let end = end_date
        .and_time(end)
        .and_local_timezone(tz.clone())
        .earliest()?
        .timestamp_millis();
    Span::try_new(start, end)
}

/// Remaining time until `end`, e.g. `"1h 5m 3s"`, or `"Time's up!"` once reached.
pub fn format_remaining(end: Ms, now: Ms) -> String {
    let diff = end - now;
    if diff <= 0 {
        return "Time's up!".to_string();
    }
    let total_secs = diff / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else {
        format!("{minutes}m {seconds}s")
    }
}
