use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{BOOKINGS_REQUESTED_TOTAL, BOOKING_CONFLICTS_TOTAL, BOOKING_DECISIONS_TOTAL};
use crate::repository::{DayTxn, StatusFilter};

use super::conflict::{check_conflict, check_conflict_excluding};
use super::transition::{authorize, transition};
use super::{validate_actor_id, BookingEngine, BookingError, SiblingPolicy};

/// A freshly created pending booking, plus the pending requests it overlaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequested {
    pub booking: Booking,
    pub warnings: Vec<Booking>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
    pub booking: Booking,
    /// Overlapping pending requests rejected alongside the confirmation.
    pub auto_rejected: Vec<Booking>,
    /// Overlapping requests the auto-reject could not write. They stay
    /// pending and can be rejected explicitly.
    pub still_pending: Vec<Ulid>,
}

impl BookingEngine {
    pub async fn request_booking(
        &self,
        slot: TimeSlot,
        requested_by: &str,
    ) -> Result<BookingRequested, BookingError> {
        slot.validate(&self.hours)?;
        validate_actor_id(requested_by)?;
        self.active_room(slot.room_id).await?;

        let mut txn = self
            .bounded("lock_day", self.repo.lock_day(slot.room_id, slot.date))
            .await?;
        let existing = self
            .bounded("list_bookings", txn.list_bookings(StatusFilter::Active))
            .await?;

        let result = check_conflict(&slot, &existing, &self.policy);
        if result.conflicting {
            warn!(
                "request for room {} on {} {} blocked by {} confirmed booking(s)",
                slot.room_id,
                slot.date,
                slot.span,
                result.hard().len()
            );
            metrics::counter!(BOOKING_CONFLICTS_TOTAL, "tier" => "hard").increment(1);
            return Err(BookingError::Conflict {
                with: result.hard_ids(),
            });
        }
        if !result.soft().is_empty() {
            debug!(
                "request for room {} on {} {} overlaps {} pending request(s)",
                slot.room_id,
                slot.date,
                slot.span,
                result.soft().len()
            );
            metrics::counter!(BOOKING_CONFLICTS_TOTAL, "tier" => "soft").increment(1);
        }

        let booking = self
            .bounded(
                "insert_booking",
                txn.insert_booking(NewBooking {
                    room_id: slot.room_id,
                    date: slot.date,
                    span: slot.span,
                    requested_by: requested_by.to_string(),
                }),
            )
            .await?;
        metrics::counter!(BOOKINGS_REQUESTED_TOTAL).increment(1);
        info!(
            "booking {} requested by {requested_by}: room {} on {} {} ({} min)",
            booking.id,
            booking.room_id,
            booking.date,
            booking.span,
            booking.span.duration_minutes()
        );

        Ok(BookingRequested {
            booking,
            warnings: result.soft().to_vec(),
        })
    }

    pub async fn confirm(&self, id: Ulid, actor: &Actor) -> Result<Confirmed, BookingError> {
        let (mut txn, current) = self.lock_booking(id).await?;
        authorize(actor, &current, Decision::Confirm)?;
        let next = transition(&current, Decision::Confirm)?;

        // Re-check under the lock: another request may have been confirmed
        // since this one was created.
        let day = self
            .bounded("list_bookings", txn.list_bookings(StatusFilter::Active))
            .await?;
        let result = check_conflict_excluding(&current.slot(), &day, Some(id), &self.policy);
        if result.conflicting {
            warn!(
                "confirming {id} blocked by confirmed booking(s) {:?}; it stays pending",
                result.hard_ids()
            );
            metrics::counter!(BOOKING_CONFLICTS_TOTAL, "tier" => "hard").increment(1);
            return Err(BookingError::Conflict {
                with: result.hard_ids(),
            });
        }

        let now = now_ms();
        let booking = self
            .bounded("update_status", txn.update_status(id, next, &actor.id, now))
            .await?;
        metrics::counter!(BOOKING_DECISIONS_TOTAL, "status" => next.as_str()).increment(1);
        info!(
            "booking {id} confirmed by {}: room {} on {} {}",
            actor.id, booking.room_id, booking.date, booking.span
        );

        let mut auto_rejected = Vec::new();
        let mut still_pending = Vec::new();
        if self.siblings == SiblingPolicy::AutoReject {
            let pending = result
                .soft()
                .iter()
                .filter(|b| b.status == BookingStatus::Pending);
            for sibling in pending {
                // The confirmation is already durable; a failed sibling is
                // reported back, not turned into an error.
                let rejected = match transition(sibling, Decision::Reject) {
                    Ok(status) => {
                        self.bounded(
                            "update_status",
                            txn.update_status(sibling.id, status, &actor.id, now),
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                match rejected {
                    Ok(rejected) => {
                        metrics::counter!(BOOKING_DECISIONS_TOTAL, "status" => rejected.status.as_str())
                            .increment(1);
                        info!("booking {} auto-rejected: overlaps confirmed {id}", sibling.id);
                        auto_rejected.push(rejected);
                    }
                    Err(e) => {
                        warn!("booking {} left pending after confirming {id}: {e}", sibling.id);
                        still_pending.push(sibling.id);
                    }
                }
            }
        }

        Ok(Confirmed {
            booking,
            auto_rejected,
            still_pending,
        })
    }

    pub async fn reject(&self, id: Ulid, actor: &Actor) -> Result<Booking, BookingError> {
        let (mut txn, current) = self.lock_booking(id).await?;
        authorize(actor, &current, Decision::Reject)?;
        let next = transition(&current, Decision::Reject)?;

        let booking = self
            .bounded("update_status", txn.update_status(id, next, &actor.id, now_ms()))
            .await?;
        metrics::counter!(BOOKING_DECISIONS_TOTAL, "status" => next.as_str()).increment(1);
        info!("booking {id} rejected by {}", actor.id);
        Ok(booking)
    }

    /// Find the booking's day, lock it, and re-read the booking under the lock.
    async fn lock_booking(
        &self,
        id: Ulid,
    ) -> Result<(Box<dyn DayTxn + '_>, Booking), BookingError> {
        let found = self.load_booking(id).await?;
        let mut txn = self
            .bounded("lock_day", self.repo.lock_day(found.room_id, found.date))
            .await?;
        let current = self
            .bounded("list_bookings", txn.list_bookings(StatusFilter::All))
            .await?
            .into_iter()
            .find(|b| b.id == id)
            .ok_or(BookingError::NotFound(id))?;
        Ok((txn, current))
    }
}
