use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::OwnedRwLockWriteGuard;
use ulid::Ulid;

use crate::limits::MAX_BOOKINGS_PER_DAY;
use crate::model::*;
use crate::repository::{DayTxn, RepositoryError, StatusFilter};

use super::Store;

/// Every booking of one room on one date, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct DayState {
    pub room_id: Ulid,
    pub date: NaiveDate,
    pub bookings: Vec<Booking>,
}

impl DayState {
    pub fn new(room_id: Ulid, date: NaiveDate) -> Self {
        Self {
            room_id,
            date,
            bookings: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.span.start <= booking.span.start);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| &b.id == id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| &b.id == id)
    }

    pub fn filtered(&self, filter: StatusFilter) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|b| filter.matches(b.status))
            .cloned()
            .collect()
    }
}

/// Exclusive hold on one day of the [`Store`], released on drop.
///
/// Writes hand the guard to a spawned task that appends, applies and then
/// gives it back. If the caller stops waiting, the task still finishes
/// (memory and log stay in step), the day unlocks when it does, and this
/// transaction refuses further use.
pub(crate) struct StoreDay<'a> {
    store: &'a Store,
    room_id: Ulid,
    date: NaiveDate,
    guard: Option<OwnedRwLockWriteGuard<DayState>>,
}

impl<'a> StoreDay<'a> {
    pub(crate) fn new(store: &'a Store, guard: OwnedRwLockWriteGuard<DayState>) -> Self {
        Self {
            store,
            room_id: guard.room_id,
            date: guard.date,
            guard: Some(guard),
        }
    }

    fn state(&self) -> Result<&DayState, RepositoryError> {
        self.guard.as_deref().ok_or_else(interrupted)
    }

    async fn persist(&mut self, event: Event) -> Result<&DayState, RepositoryError> {
        let mut guard = self.guard.take().ok_or_else(interrupted)?;
        let writer = self.store.writer();
        let task = tokio::spawn(async move {
            let result = writer.persist_and_apply(&mut guard, &event).await;
            (guard, result)
        });
        let (guard, result) = task
            .await
            .map_err(|e| RepositoryError::Unavailable(format!("day write task failed: {e}")))?;
        let guard = self.guard.insert(guard);
        result?;
        Ok(&**guard)
    }
}

fn interrupted() -> RepositoryError {
    RepositoryError::Unavailable("day transaction was interrupted mid-write".into())
}

#[async_trait]
impl<'a> DayTxn for StoreDay<'a> {
    fn room_id(&self) -> Ulid {
        self.room_id
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    async fn list_bookings(&mut self, filter: StatusFilter) -> Result<Vec<Booking>, RepositoryError> {
        Ok(self.state()?.filtered(filter))
    }

    async fn insert_booking(&mut self, booking: NewBooking) -> Result<Booking, RepositoryError> {
        if booking.room_id != self.room_id() || booking.date != self.date() {
            return Err(RepositoryError::Unavailable(format!(
                "booking for {} on {} written through the lock for {} on {}",
                booking.room_id,
                booking.date,
                self.room_id(),
                self.date()
            )));
        }
        if self.state()?.bookings.len() >= MAX_BOOKINGS_PER_DAY {
            return Err(RepositoryError::LimitExceeded("too many bookings for this room and date"));
        }
        let id = Ulid::new();
        let event = Event::BookingRequested {
            id,
            room_id: booking.room_id,
            date: booking.date,
            span: booking.span,
            requested_by: booking.requested_by,
            created_at: now_ms(),
        };
        self.persist(event)
            .await?
            .booking(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn update_status(
        &mut self,
        id: Ulid,
        status: BookingStatus,
        decided_by: &str,
        decided_at: Ms,
    ) -> Result<Booking, RepositoryError> {
        if self.state()?.booking(&id).is_none() {
            return Err(RepositoryError::NotFound(id));
        }
        let event = Event::BookingDecided {
            id,
            room_id: self.room_id,
            date: self.date,
            status,
            decided_by: decided_by.to_string(),
            decided_at,
        };
        self.persist(event)
            .await?
            .booking(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }
}
