//! Marketplace projections on the subject registry.
//!
//! The subject registry owns the animals; the core reads and writes only
//! this small marketplace projection per subject, and derives the batch
//! aggregate from it. The aggregate is a pure function of the member
//! projections and is recomputed synchronously inside the same
//! transaction as any member write; it is never independently authored.

use chrono::{DateTime, Utc};
use common::{BatchId, ListingId, SubjectId};
use serde::{Deserialize, Serialize};

/// Marketplace status of a single subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubjectMarketStatus {
    /// Not on the marketplace; free to be listed.
    #[default]
    NotListed,

    /// Covered by an active listing.
    Listed,

    /// Covered by a reserved listing awaiting finalization.
    Reserved,

    /// Sold; the subject has left the herd.
    Sold,
}

impl SubjectMarketStatus {
    /// Returns true if the subject currently counts as listed on the
    /// marketplace.
    pub fn is_on_market(&self) -> bool {
        matches!(self, SubjectMarketStatus::Listed | SubjectMarketStatus::Reserved)
    }

    /// Returns the status name as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectMarketStatus::NotListed => "not_listed",
            SubjectMarketStatus::Listed => "listed",
            SubjectMarketStatus::Reserved => "reserved",
            SubjectMarketStatus::Sold => "sold",
        }
    }
}

impl std::str::FromStr for SubjectMarketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_listed" => Ok(SubjectMarketStatus::NotListed),
            "listed" => Ok(SubjectMarketStatus::Listed),
            "reserved" => Ok(SubjectMarketStatus::Reserved),
            "sold" => Ok(SubjectMarketStatus::Sold),
            other => Err(format!("unknown subject status: {other}")),
        }
    }
}

/// Per-subject marketplace projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProjection {
    pub subject_id: SubjectId,
    /// The batch this subject belongs to, if any.
    pub batch_id: Option<BatchId>,
    pub status: SubjectMarketStatus,
    /// The listing currently covering this subject.
    pub listing_id: Option<ListingId>,
    pub listed_at: Option<DateTime<Utc>>,
    pub sold_at: Option<DateTime<Utc>>,
}

impl SubjectProjection {
    /// Creates the projection for a subject that has never been listed.
    pub fn unlisted(subject_id: SubjectId, batch_id: Option<BatchId>) -> Self {
        Self {
            subject_id,
            batch_id,
            status: SubjectMarketStatus::NotListed,
            listing_id: None,
            listed_at: None,
            sold_at: None,
        }
    }

    /// Marks the subject covered by an active listing.
    pub fn mark_listed(&mut self, listing_id: ListingId, at: DateTime<Utc>) {
        self.status = SubjectMarketStatus::Listed;
        self.listing_id = Some(listing_id);
        self.listed_at = Some(at);
    }

    /// Marks the subject covered by a reserved listing.
    pub fn mark_reserved(&mut self, listing_id: ListingId) {
        self.status = SubjectMarketStatus::Reserved;
        self.listing_id = Some(listing_id);
    }

    /// Returns a reserved subject to `Listed` when the reservation is
    /// released without a sale.
    pub fn release_reservation(&mut self) {
        self.status = SubjectMarketStatus::Listed;
    }

    /// Marks the subject sold.
    pub fn mark_sold(&mut self, at: DateTime<Utc>) {
        self.status = SubjectMarketStatus::Sold;
        self.sold_at = Some(at);
    }

    /// Reverts the projection so the subject becomes listable again,
    /// the policy applied when its listing is removed.
    pub fn clear(&mut self) {
        self.status = SubjectMarketStatus::NotListed;
        self.listing_id = None;
        self.listed_at = None;
    }
}

/// Aggregate marketplace status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchMarketStatus {
    /// No member is on the marketplace and none was sold.
    #[default]
    NotListed,

    /// At least one member is listed or reserved; none sold yet.
    Available,

    /// Some members are sold and others are not.
    Partial,

    /// Every member is sold.
    Sold,
}

impl BatchMarketStatus {
    /// Returns the status name as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchMarketStatus::NotListed => "not_listed",
            BatchMarketStatus::Available => "available",
            BatchMarketStatus::Partial => "partial",
            BatchMarketStatus::Sold => "sold",
        }
    }
}

impl std::str::FromStr for BatchMarketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_listed" => Ok(BatchMarketStatus::NotListed),
            "available" => Ok(BatchMarketStatus::Available),
            "partial" => Ok(BatchMarketStatus::Partial),
            "sold" => Ok(BatchMarketStatus::Sold),
            other => Err(format!("unknown batch status: {other}")),
        }
    }
}

/// Derived batch-level view of its members' projections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAggregate {
    pub batch_id: BatchId,
    pub status: BatchMarketStatus,
    /// Number of members currently listed or reserved.
    pub listed_count: u32,
}

impl BatchAggregate {
    /// Derives the aggregate from the member projections.
    ///
    /// `Sold` iff every member is sold (and the batch is non-empty);
    /// `Partial` when some but not all are sold; `Available` when at
    /// least one member is on the marketplace; `NotListed` otherwise.
    pub fn derive(batch_id: BatchId, members: &[SubjectProjection]) -> Self {
        let sold = members
            .iter()
            .filter(|m| m.status == SubjectMarketStatus::Sold)
            .count();
        let listed_count = members.iter().filter(|m| m.status.is_on_market()).count() as u32;

        let status = if members.is_empty() {
            BatchMarketStatus::NotListed
        } else if sold == members.len() {
            BatchMarketStatus::Sold
        } else if sold > 0 {
            BatchMarketStatus::Partial
        } else if listed_count > 0 {
            BatchMarketStatus::Available
        } else {
            BatchMarketStatus::NotListed
        };

        Self {
            batch_id,
            status,
            listed_count,
        }
    }
}
