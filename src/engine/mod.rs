mod conflict;
mod error;
mod mutations;
mod queries;
mod transition;

pub use conflict::{
    check_conflict, check_conflict_excluding, ConflictPolicy, ConflictResult, ConflictTier,
    SiblingPolicy, DEFAULT_CONFLICT_POLICY,
};
pub use error::BookingError;
pub use mutations::{BookingRequested, Confirmed};
pub use transition::{authorize, transition};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use ulid::Ulid;

use crate::config::Config;
use crate::limits::MAX_ACTOR_ID_LEN;
use crate::model::*;
use crate::repository::{BookingRepository, RepositoryError};

/// Stateless façade over a [`BookingRepository`]. Every operation is one
/// read-decide-write under the repository's per-day lock; nothing is kept
/// between calls.
pub struct BookingEngine {
    repo: Arc<dyn BookingRepository>,
    hours: OperatingHours,
    timeout: Duration,
    policy: ConflictPolicy,
    siblings: SiblingPolicy,
}

impl BookingEngine {
    /// Fails closed when the repository can't serialize same-day writers.
    pub fn new(repo: Arc<dyn BookingRepository>, config: &Config) -> Result<Self, BookingError> {
        let isolation = repo.isolation();
        if !isolation.prevents_lost_updates() {
            return Err(BookingError::InsufficientIsolation(isolation));
        }
        info!(
            "booking engine ready: isolation={isolation:?} hours={} timeout={:?} siblings={}",
            config.hours.window(),
            config.repository_timeout,
            config.sibling_policy
        );
        Ok(Self {
            repo,
            hours: config.hours,
            timeout: config.repository_timeout,
            policy: DEFAULT_CONFLICT_POLICY,
            siblings: config.sibling_policy,
        })
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn hours(&self) -> &OperatingHours {
        &self.hours
    }

    pub fn sibling_policy(&self) -> SiblingPolicy {
        self.siblings
    }

    /// Run a repository call under the configured timeout. Elapsing is
    /// reported, never retried here.
    pub(super) async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, BookingError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(BookingError::from),
            Err(_) => {
                warn!("repository {op} timed out after {:?}", self.timeout);
                metrics::counter!(crate::observability::REPOSITORY_TIMEOUTS_TOTAL, "op" => op)
                    .increment(1);
                Err(BookingError::RepositoryUnavailable(format!(
                    "{op} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    pub(super) async fn load_booking(&self, id: Ulid) -> Result<Booking, BookingError> {
        self.bounded("find_booking", self.repo.find_booking(id))
            .await?
            .ok_or(BookingError::NotFound(id))
    }

    pub(super) async fn active_room(&self, room_id: Ulid) -> Result<Room, BookingError> {
        let room = self
            .bounded("room", self.repo.room(room_id))
            .await?
            .ok_or(BookingError::NotFound(room_id))?;
        if !room.active {
            return Err(BookingError::RoomInactive(room_id));
        }
        Ok(room)
    }
}

pub(super) fn validate_actor_id(id: &str) -> Result<(), BookingError> {
    if id.trim().is_empty() {
        return Err(BookingError::InvalidSlot("requester must not be empty".into()));
    }
    if id.len() > MAX_ACTOR_ID_LEN {
        return Err(BookingError::LimitExceeded("actor id too long"));
    }
    Ok(())
}
