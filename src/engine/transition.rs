//! Booking lifecycle: `Pending → Confirmed | Rejected`, both terminal.

use crate::model::*;

use super::BookingError;

impl BookingStatus {
    /// The status a decision leads to, or `None` if this status is terminal.
    pub fn apply(self, decision: Decision) -> Option<BookingStatus> {
        match (self, decision) {
            (BookingStatus::Pending, Decision::Confirm) => Some(BookingStatus::Confirmed),
            (BookingStatus::Pending, Decision::Reject) => Some(BookingStatus::Rejected),
            (BookingStatus::Confirmed | BookingStatus::Rejected, _) => None,
        }
    }
}

pub fn transition(booking: &Booking, decision: Decision) -> Result<BookingStatus, BookingError> {
    booking
        .status
        .apply(decision)
        .ok_or(BookingError::InvalidTransition {
            id: booking.id,
            from: booking.status,
            decision,
        })
}

/// Approvers may confirm or reject; a requester may only withdraw (reject)
/// their own request.
pub fn authorize(actor: &Actor, booking: &Booking, decision: Decision) -> Result<(), BookingError> {
    let allowed = match (actor.role, decision) {
        (Role::Approver, _) => true,
        (Role::Member, Decision::Reject) => actor.id == booking.requested_by,
        (Role::Member, Decision::Confirm) => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(BookingError::Unauthorized {
            actor: actor.id.clone(),
            decision,
        })
    }
}
