use std::str::FromStr;

use ulid::Ulid;

use crate::model::*;

/// How an overlap with an existing booking is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictTier {
    /// Rejects the candidate outright.
    HardBlock,
    /// Reported to the caller, but the candidate is accepted.
    SoftWarn,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPolicy {
    pub against_pending: ConflictTier,
    pub against_confirmed: ConflictTier,
}

/// Many provisional requests may share a window; only one grant may.
pub const DEFAULT_CONFLICT_POLICY: ConflictPolicy = ConflictPolicy {
    against_pending: ConflictTier::SoftWarn,
    against_confirmed: ConflictTier::HardBlock,
};

impl ConflictPolicy {
    pub fn tier(&self, status: BookingStatus) -> ConflictTier {
        match status {
            BookingStatus::Pending => self.against_pending,
            BookingStatus::Confirmed => self.against_confirmed,
            BookingStatus::Rejected => ConflictTier::Ignore,
        }
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        DEFAULT_CONFLICT_POLICY
    }
}

/// What happens to overlapping pending requests once one is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingPolicy {
    /// Reject them in the same transaction as the confirmation.
    AutoReject,
    /// Leave them pending for an approver to reject explicitly.
    KeepPending,
}

impl FromStr for SiblingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto-reject" | "auto_reject" => Ok(SiblingPolicy::AutoReject),
            "keep-pending" | "keep_pending" => Ok(SiblingPolicy::KeepPending),
            other => Err(format!("unknown sibling policy: {other}")),
        }
    }
}

impl std::fmt::Display for SiblingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SiblingPolicy::AutoReject => "auto-reject",
            SiblingPolicy::KeepPending => "keep-pending",
        })
    }
}

/// Outcome of checking a candidate slot against a room's day.
///
/// `conflicts_with` lists hard overlaps first, then soft ones, each group
/// ordered by start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResult {
    pub conflicting: bool,
    pub conflicts_with: Vec<Booking>,
    hard_count: usize,
}

impl ConflictResult {
    pub fn hard(&self) -> &[Booking] {
        &self.conflicts_with[..self.hard_count]
    }

    pub fn soft(&self) -> &[Booking] {
        &self.conflicts_with[self.hard_count..]
    }

    pub fn hard_ids(&self) -> Vec<Ulid> {
        self.hard().iter().map(|b| b.id).collect()
    }
}

pub fn check_conflict(
    candidate: &TimeSlot,
    existing: &[Booking],
    policy: &ConflictPolicy,
) -> ConflictResult {
    check_conflict_excluding(candidate, existing, None, policy)
}

/// Like [`check_conflict`], skipping `exclude` (the booking being
/// re-validated). Bookings on other rooms or dates are ignored.
pub fn check_conflict_excluding(
    candidate: &TimeSlot,
    existing: &[Booking],
    exclude: Option<Ulid>,
    policy: &ConflictPolicy,
) -> ConflictResult {
    let mut hard = Vec::new();
    let mut soft = Vec::new();
    for booking in existing {
        if Some(booking.id) == exclude || !candidate.overlaps(&booking.slot()) {
            continue;
        }
        match policy.tier(booking.status) {
            ConflictTier::HardBlock => hard.push(booking.clone()),
            ConflictTier::SoftWarn => soft.push(booking.clone()),
            ConflictTier::Ignore => {}
        }
    }
    hard.sort_by_key(|b| (b.span.start, b.id));
    soft.sort_by_key(|b| (b.span.start, b.id));

    let hard_count = hard.len();
    hard.extend(soft);
    ConflictResult {
        conflicting: hard_count > 0,
        conflicts_with: hard,
        hard_count,
    }
}
