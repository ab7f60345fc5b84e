use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Unix milliseconds. Used for commit timestamps only; slot times are wall-clock.
pub type Ms = i64;

/// Day of the week a slot repeats on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    #[serde(rename = "mon", alias = "monday")]
    Mon,
    #[serde(rename = "tue", alias = "tuesday")]
    Tue,
    #[serde(rename = "wed", alias = "wednesday")]
    Wed,
    #[serde(rename = "thu", alias = "thursday")]
    Thu,
    #[serde(rename = "fri", alias = "friday")]
    Fri,
    #[serde(rename = "sat", alias = "saturday")]
    Sat,
    #[serde(rename = "sun", alias = "sunday")]
    Sun,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Mon => "mon",
            Weekday::Tue => "tue",
            Weekday::Wed => "wed",
            Weekday::Thu => "thu",
            Weekday::Fri => "fri",
            Weekday::Sat => "sat",
            Weekday::Sun => "sun",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock time of day, stored as seconds since midnight.
///
/// Parses and renders as `HH:MM` (or `HH:MM:SS` when seconds are set).
/// `24:00` is midnight at the end of the day, so a slot can run to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u32);

impl ClockTime {
    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Option<Self> {
        let end_of_day = hour == 24 && minute == 0 && second == 0;
        if end_of_day || (hour < 24 && minute < 60 && second < 60) {
            Some(Self(hour * 3600 + minute * 60 + second))
        } else {
            None
        }
    }

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        Self::from_hms(hour, minute, 0)
    }

    pub fn seconds(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseClockTimeError(String);

impl fmt::Display for ParseClockTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time of day {:?}, expected HH:MM", self.0)
    }
}

impl std::error::Error for ParseClockTimeError {}

fn parse_clock_field(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for ClockTime {
    type Err = ParseClockTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseClockTimeError(s.to_string());
        let mut parts = s.trim().split(':');
        let hour = parts.next().and_then(parse_clock_field).ok_or_else(err)?;
        let minute = parts.next().and_then(parse_clock_field).ok_or_else(err)?;
        let second = match parts.next() {
            Some(p) => parse_clock_field(p).ok_or_else(err)?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(err());
        }
        Self::from_hms(hour, minute, second).ok_or_else(err)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = (self.0 / 3600, self.0 / 60 % 60, self.0 % 60);
        if s == 0 {
            write!(f, "{h:02}:{m:02}")
        } else {
            write!(f, "{h:02}:{m:02}:{s:02}")
        }
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A weekly occurrence `[start_time, end_time)` on `day`, optionally bound to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub room_id: Option<Ulid>,
}

impl Slot {
    pub fn new(day: Weekday, start_time: ClockTime, end_time: ClockTime, room_id: Option<Ulid>) -> Self {
        debug_assert!(start_time < end_time, "Slot start must be before end");
        Self {
            day,
            start_time,
            end_time,
            room_id,
        }
    }

    pub fn duration_secs(&self) -> u32 {
        self.end_time.seconds().saturating_sub(self.start_time.seconds())
    }

    /// Same day and the half-open intervals intersect. Touching slots do not overlap.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.day == other.day
            && self.start_time.max(other.start_time) < self.end_time.min(other.end_time)
    }

    /// Both slots reference the same room. Roomless slots never share.
    pub fn shares_room(&self, other: &Slot) -> bool {
        matches!((self.room_id, other.room_id), (Some(a), Some(b)) if a == b)
    }
}

/// Date range bounding how long the weekly pattern repeats. Informational only:
/// conflict detection ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Period {
    pub fn is_valid(&self) -> bool {
        self.start_date <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub active: bool,
}

/// Cohort + program + course unit + instructor bound to a weekly pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: Ulid,
    pub cohort_id: Ulid,
    pub program_id: Ulid,
    pub course_unit_id: Ulid,
    pub instructor_id: Ulid,
    pub slots: Vec<Slot>,
    pub period: Period,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Assignment {
    /// Rooms referenced by this assignment's slots, deduplicated.
    pub fn room_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.slots.iter().filter_map(|s| s.room_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRequest {
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(default)]
    pub room_label: Option<String>,
}

/// Payload of a create or update: everything but the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDraft {
    pub cohort_id: Ulid,
    pub program_id: Ulid,
    pub course_unit_id: Ulid,
    pub instructor_id: Ulid,
    pub slots: Vec<SlotRequest>,
    pub period: Period,
}

/// The WAL record format. Assignments are written whole, slots embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated { room: Room },
    AssignmentCreated { assignment: Assignment },
    AssignmentUpdated { assignment: Assignment },
    AssignmentDeleted { id: Ulid },
}

// ── Query result types ───────────────────────────────────────────

/// One candidate slot colliding with one slot of an existing assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotOverlap {
    /// Index into the candidate slot list.
    pub candidate: usize,
    pub existing: Slot,
}

/// An existing assignment that collides with a candidate pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub assignment_id: Ulid,
    pub cohort_id: Ulid,
    pub program_id: Ulid,
    pub course_unit_id: Ulid,
    pub instructor_id: Ulid,
    pub overlaps: Vec<SlotOverlap>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub instructor_conflicts: Vec<Conflict>,
    pub room_conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.instructor_conflicts.is_empty() && self.room_conflicts.is_empty()
    }
}

/// Optional listing filters; all set fields must match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentFilter {
    pub cohort: Option<Ulid>,
    pub program: Option<Ulid>,
    pub instructor: Option<Ulid>,
    pub room: Option<Ulid>,
}

impl AssignmentFilter {
    pub fn matches(&self, assignment: &Assignment) -> bool {
        self.cohort.is_none_or(|c| c == assignment.cohort_id)
            && self.program.is_none_or(|p| p == assignment.program_id)
            && self.instructor.is_none_or(|i| i == assignment.instructor_id)
            && self
                .room
                .is_none_or(|r| assignment.slots.iter().any(|s| s.room_id == Some(r)))
    }
}
