use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::calendar::{format_time_of_day, parse_iso_date, parse_time_of_day};
use crate::engine::BookingError;
use crate::limits::MINUTES_PER_DAY;

/// Unix milliseconds, used for audit timestamps.
pub type Ms = i64;

/// Minutes since midnight, `0..=1440`.
pub type Minute = u16;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Half-open interval `[start, end)` within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            format_time_of_day(self.start),
            format_time_of_day(self.end)
        )
    }
}

/// The bookable window of a day. `close` may equal 1440 (midnight).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingHours {
    pub open: Minute,
    pub close: Minute,
}

impl OperatingHours {
    pub const ALL_DAY: OperatingHours = OperatingHours {
        open: 0,
        close: MINUTES_PER_DAY,
    };

    pub fn new(open: Minute, close: Minute) -> Option<Self> {
        (open < close && close <= MINUTES_PER_DAY).then_some(Self { open, close })
    }

    pub fn window(&self) -> Span {
        Span::new(self.open, self.close)
    }
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self::ALL_DAY
    }
}

/// A room + date + interval that can be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub room_id: Ulid,
    pub date: NaiveDate,
    pub span: Span,
}

impl TimeSlot {
    pub fn new(
        room_id: Ulid,
        date: NaiveDate,
        start: Minute,
        end: Minute,
        hours: &OperatingHours,
    ) -> Result<Self, BookingError> {
        if start >= end {
            return Err(BookingError::InvalidSlot(format!(
                "start {} is not before end {}",
                format_time_of_day(start),
                format_time_of_day(end)
            )));
        }
        let slot = Self {
            room_id,
            date,
            span: Span { start, end },
        };
        slot.validate(hours)?;
        Ok(slot)
    }

    /// Build a slot from an ISO-8601 date and `HH:MM` times.
    pub fn parse(
        room_id: Ulid,
        date: &str,
        start: &str,
        end: &str,
        hours: &OperatingHours,
    ) -> Result<Self, BookingError> {
        let date = parse_iso_date(date)?;
        let start = parse_time_of_day(start)?;
        let end = parse_time_of_day(end)?;
        Self::new(room_id, date, start, end, hours)
    }

    /// Re-check ordering and bounds; fields are public so a slot may have
    /// been assembled by hand or against different hours.
    pub fn validate(&self, hours: &OperatingHours) -> Result<(), BookingError> {
        if self.span.start >= self.span.end {
            return Err(BookingError::InvalidSlot(format!(
                "start {} is not before end {}",
                format_time_of_day(self.span.start),
                format_time_of_day(self.span.end)
            )));
        }
        if !hours.window().contains_span(&self.span) {
            return Err(BookingError::InvalidSlot(format!(
                "{} is outside operating hours {}",
                self.span,
                hours.window()
            )));
        }
        Ok(())
    }

    /// Slots on different rooms or dates never overlap.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.room_id == other.room_id && self.date == other.date && self.span.overlaps(&other.span)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: Option<u32>,
    pub active: bool,
}

impl Room {
    pub fn new(id: Ulid, name: impl Into<String>, capacity: Option<u32>) -> Self {
        Self {
            id,
            name: name.into(),
            capacity,
            active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change requested by an approver or the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Confirm,
    Reject,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Confirm => "confirm",
            Decision::Reject => "reject",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub date: NaiveDate,
    pub span: Span,
    pub requested_by: String,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub decided_at: Option<Ms>,
    pub decided_by: Option<String>,
}

impl Booking {
    pub fn slot(&self) -> TimeSlot {
        TimeSlot {
            room_id: self.room_id,
            date: self.date,
            span: self.span,
        }
    }
}

/// What the orchestrator hands to the repository; id and `created_at`
/// are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub room_id: Ulid,
    pub date: NaiveDate,
    pub span: Span,
    pub requested_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Approver,
}

/// Caller identity as resolved by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn member(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Member,
        }
    }

    pub fn approver(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Approver,
        }
    }
}

/// Flat event types, no nesting. This is the WAL record format and
/// the payload of the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomRegistered {
        id: Ulid,
        name: String,
        capacity: Option<u32>,
    },
    RoomRetired {
        id: Ulid,
    },
    BookingRequested {
        id: Ulid,
        room_id: Ulid,
        date: NaiveDate,
        span: Span,
        requested_by: String,
        created_at: Ms,
    },
    BookingDecided {
        id: Ulid,
        room_id: Ulid,
        date: NaiveDate,
        status: BookingStatus,
        decided_by: String,
        decided_at: Ms,
    },
}

impl Event {
    pub fn room_id(&self) -> Ulid {
        match self {
            Event::RoomRegistered { id, .. } | Event::RoomRetired { id } => *id,
            Event::BookingRequested { room_id, .. } | Event::BookingDecided { room_id, .. } => {
                *room_id
            }
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// One cell of a room's month view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCell {
    pub day_of_month: Option<u32>,
    pub date: NaiveDate,
    pub pending: usize,
    pub confirmed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthOverview {
    pub room_id: Ulid,
    pub year: i32,
    pub month: u32,
    pub cells: Vec<DayCell>,
}
