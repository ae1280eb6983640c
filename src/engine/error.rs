use ulid::Ulid;

use crate::model::{BookingStatus, Decision};
use crate::repository::{Isolation, RepositoryError};

#[derive(Debug)]
pub enum BookingError {
    /// Malformed interval, outside operating hours, or unparsable input.
    InvalidSlot(String),
    InvalidTransition {
        id: Ulid,
        from: BookingStatus,
        decision: Decision,
    },
    /// Overlaps confirmed bookings; carries their ids.
    Conflict {
        with: Vec<Ulid>,
    },
    RepositoryUnavailable(String),
    NotFound(Ulid),
    RoomInactive(Ulid),
    Unauthorized {
        actor: String,
        decision: Decision,
    },
    InsufficientIsolation(Isolation),
    LimitExceeded(&'static str),
}

impl BookingError {
    /// Only persistence failures are worth retrying, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::RepositoryUnavailable(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BookingError::Conflict { .. })
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidSlot(msg) => write!(f, "invalid slot: {msg}"),
            BookingError::InvalidTransition { id, from, decision } => {
                write!(f, "cannot {decision} booking {id}: already {from}")
            }
            BookingError::Conflict { with } => {
                write!(f, "room is already booked for that time")?;
                if !with.is_empty() {
                    let ids: Vec<String> = with.iter().map(Ulid::to_string).collect();
                    write!(f, " (conflicts with {})", ids.join(", "))?;
                }
                Ok(())
            }
            BookingError::RepositoryUnavailable(e) => {
                write!(f, "could not reach booking storage, please retry: {e}")
            }
            BookingError::NotFound(id) => write!(f, "not found: {id}"),
            BookingError::RoomInactive(id) => write!(f, "room {id} is not accepting bookings"),
            BookingError::Unauthorized { actor, decision } => {
                write!(f, "{actor} may not {decision} this booking")
            }
            BookingError::InsufficientIsolation(level) => write!(
                f,
                "repository isolation {level:?} cannot prevent double-booking; refusing to start"
            ),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<RepositoryError> for BookingError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => BookingError::NotFound(id),
            RepositoryError::LimitExceeded(msg) => BookingError::LimitExceeded(msg),
            RepositoryError::Unavailable(msg) => BookingError::RepositoryUnavailable(msg),
        }
    }
}
