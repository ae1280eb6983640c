use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::calendar::calendar_grid;
use crate::model::*;
use crate::repository::StatusFilter;

use super::{BookingEngine, BookingError};

impl BookingEngine {
    pub async fn booking(&self, id: Ulid) -> Result<Booking, BookingError> {
        self.load_booking(id).await
    }

    /// One room's bookings for a date, ordered by start time.
    pub async fn day_bookings(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        filter: StatusFilter,
    ) -> Result<Vec<Booking>, BookingError> {
        self.bounded("list_bookings", self.repo.list_bookings(room_id, date, filter))
            .await
    }

    /// The month grid containing `reference`, with pending and confirmed
    /// counts per day. Padding cells carry no counts.
    pub async fn month_overview(
        &self,
        room_id: Ulid,
        reference: NaiveDate,
    ) -> Result<MonthOverview, BookingError> {
        let mut cells = Vec::new();
        for cell in calendar_grid(reference) {
            let (mut pending, mut confirmed) = (0, 0);
            if cell.day_of_month.is_some() {
                for b in self
                    .day_bookings(room_id, cell.date, StatusFilter::Active)
                    .await?
                {
                    match b.status {
                        BookingStatus::Pending => pending += 1,
                        BookingStatus::Confirmed => confirmed += 1,
                        BookingStatus::Rejected => {}
                    }
                }
            }
            cells.push(DayCell {
                day_of_month: cell.day_of_month,
                date: cell.date,
                pending,
                confirmed,
            });
        }
        Ok(MonthOverview {
            room_id,
            year: reference.year(),
            month: reference.month(),
            cells,
        })
    }
}
