use crate::model::Minute;

/// Minutes in a calendar day; the widest operating-hours window.
pub const MINUTES_PER_DAY: Minute = 1440;

pub const MAX_ROOM_NAME_LEN: usize = 256;
pub const MAX_ACTOR_ID_LEN: usize = 256;
pub const MAX_ROOMS: usize = 10_000;

/// Bookings of any status kept for a single room on a single date.
pub const MAX_BOOKINGS_PER_DAY: usize = 1_024;

/// Entries buffered by the WAL writer channel before senders wait.
pub const WAL_CHANNEL_CAPACITY: usize = 4_096;
