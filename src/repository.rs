//! The persistence boundary the booking engine calls through.
//!
//! Mutations happen inside a [`DayTxn`]: an exclusive hold on one
//! `(room, date)` that lasts until the value is dropped. Everything the
//! engine reads, decides and writes for that day happens under the same
//! hold, so two confirmations can never both pass the conflict check.

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Booking, BookingStatus, Ms, NewBooking, Room};

/// What a repository guarantees about concurrent read-decide-write
/// sequences on the same room and date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// No guarantee. The engine refuses to run on top of this.
    None,
    /// Exclusive lock per `(room, date)` held for the life of a `DayTxn`.
    PerRoomDay,
    /// Full serializable transactions.
    Serializable,
}

impl Isolation {
    pub fn prevents_lost_updates(self) -> bool {
        !matches!(self, Isolation::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Pending and confirmed.
    Active,
    ConfirmedOnly,
    All,
}

impl StatusFilter {
    pub fn matches(self, status: BookingStatus) -> bool {
        match self {
            StatusFilter::Active => status != BookingStatus::Rejected,
            StatusFilter::ConfirmedOnly => status == BookingStatus::Confirmed,
            StatusFilter::All => true,
        }
    }
}

#[derive(Debug)]
pub enum RepositoryError {
    Unavailable(String),
    NotFound(Ulid),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::Unavailable(e) => write!(f, "repository unavailable: {e}"),
            RepositoryError::NotFound(id) => write!(f, "not found: {id}"),
            RepositoryError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    fn isolation(&self) -> Isolation;

    async fn room(&self, room_id: Ulid) -> Result<Option<Room>, RepositoryError>;

    async fn find_booking(&self, id: Ulid) -> Result<Option<Booking>, RepositoryError>;

    /// Unlocked read of one room's day, ordered by start time.
    async fn list_bookings(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        filter: StatusFilter,
    ) -> Result<Vec<Booking>, RepositoryError>;

    /// Wait for exclusive access to `(room_id, date)`.
    async fn lock_day<'a>(
        &'a self,
        room_id: Ulid,
        date: NaiveDate,
    ) -> Result<Box<dyn DayTxn + 'a>, RepositoryError>;
}

#[async_trait]
pub trait DayTxn: Send {
    fn room_id(&self) -> Ulid;

    fn date(&self) -> NaiveDate;

    async fn list_bookings(&mut self, filter: StatusFilter) -> Result<Vec<Booking>, RepositoryError>;

    /// Store a new pending booking; the repository assigns `id` and `created_at`.
    async fn insert_booking(&mut self, booking: NewBooking) -> Result<Booking, RepositoryError>;

    async fn update_status(
        &mut self,
        id: Ulid,
        status: BookingStatus,
        decided_by: &str,
        decided_at: Ms,
    ) -> Result<Booking, RepositoryError>;
}
