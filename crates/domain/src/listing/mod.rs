//! Listing entity and lifecycle.

mod state;

pub use state::ListingState;

use chrono::{DateTime, Utc};
use common::{BatchId, FarmId, ListingId, SubjectId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::{Money, WeightKg};

/// Errors produced by listing validation and transitions.
#[derive(Debug, Error)]
pub enum ListingError {
    /// The requested transition is not legal from the current state.
    #[error("invalid listing transition: cannot {action} from {current} state")]
    InvalidTransition {
        current: ListingState,
        action: &'static str,
    },

    /// Weight must be a finite, strictly positive number of kilograms.
    #[error("weight must be a positive number of kilograms")]
    InvalidWeight,

    /// Price per kilogram must not be negative.
    #[error("price per kg must not be negative")]
    InvalidPrice,
}

/// What a listing offers for sale: one subject, or a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "listing_type", rename_all = "snake_case")]
pub enum ListingTarget {
    /// A single subject.
    Individual { subject_id: SubjectId },

    /// Every current member of a batch.
    Batch { batch_id: BatchId },
}

impl ListingTarget {
    /// Returns the subject id for individual listings.
    pub fn subject_id(&self) -> Option<SubjectId> {
        match self {
            ListingTarget::Individual { subject_id } => Some(*subject_id),
            ListingTarget::Batch { .. } => None,
        }
    }

    /// Returns the batch id for batch listings.
    pub fn batch_id(&self) -> Option<BatchId> {
        match self {
            ListingTarget::Individual { .. } => None,
            ListingTarget::Batch { batch_id } => Some(*batch_id),
        }
    }

    /// Returns the listing type as a lowercase string.
    pub fn kind_str(&self) -> &'static str {
        match self {
            ListingTarget::Individual { .. } => "individual",
            ListingTarget::Batch { .. } => "batch",
        }
    }
}

/// Why a listing left the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// The seller withdrew the listing.
    SellerRequest,

    /// A covered subject was sold through another listing.
    SubjectSoldElsewhere,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::SellerRequest => "seller_request",
            RemovalReason::SubjectSoldElsewhere => "subject_sold_elsewhere",
        }
    }
}

impl std::str::FromStr for RemovalReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seller_request" => Ok(RemovalReason::SellerRequest),
            "subject_sold_elsewhere" => Ok(RemovalReason::SubjectSoldElsewhere),
            other => Err(format!("unknown removal reason: {other}")),
        }
    }
}

/// A sale offer for one subject or a batch of subjects.
///
/// The derived total price is never stored: [`Listing::calculated_price`]
/// recomputes it from weight and per-kg price, so the two can never drift
/// apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    pub farm_id: FarmId,
    #[serde(flatten)]
    pub target: ListingTarget,
    pub weight_kg: WeightKg,
    pub price_per_kg: Money,
    pub status: ListingState,
    pub listed_at: DateTime<Utc>,
    pub sold_at: Option<DateTime<Utc>>,
    pub removal_reason: Option<RemovalReason>,
    /// Opaque photo references; storage is an external collaborator.
    pub photos: Vec<String>,
}

impl Listing {
    /// Validates inputs and creates a listing in the `Available` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ListingId,
        seller_id: UserId,
        farm_id: FarmId,
        target: ListingTarget,
        weight_kg: f64,
        price_per_kg: Money,
        photos: Vec<String>,
        listed_at: DateTime<Utc>,
    ) -> Result<Self, ListingError> {
        let weight_kg = WeightKg::new(weight_kg).ok_or(ListingError::InvalidWeight)?;
        if price_per_kg.is_negative() {
            return Err(ListingError::InvalidPrice);
        }

        Ok(Self {
            id,
            seller_id,
            farm_id,
            target,
            weight_kg,
            price_per_kg,
            status: ListingState::Available,
            listed_at,
            sold_at: None,
            removal_reason: None,
            photos,
        })
    }

    /// Total asking price, recomputed from weight and per-kg price.
    pub fn calculated_price(&self) -> Money {
        self.price_per_kg.per_kg_total(self.weight_kg)
    }

    /// Returns true if the listing still occupies its subjects
    /// (i.e. it is not in a terminal state).
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Reserves the listing after an offer was accepted.
    pub fn reserve(&mut self) -> Result<(), ListingError> {
        if !self.status.can_reserve() {
            return Err(ListingError::InvalidTransition {
                current: self.status,
                action: "reserve",
            });
        }
        self.status = ListingState::Reserved;
        Ok(())
    }

    /// Releases a reservation, returning the listing to `Available`.
    pub fn unreserve(&mut self) -> Result<(), ListingError> {
        if !self.status.can_unreserve() {
            return Err(ListingError::InvalidTransition {
                current: self.status,
                action: "unreserve",
            });
        }
        self.status = ListingState::Available;
        Ok(())
    }

    /// Finalizes the sale.
    pub fn mark_sold(&mut self, at: DateTime<Utc>) -> Result<(), ListingError> {
        if !self.status.can_sell() {
            return Err(ListingError::InvalidTransition {
                current: self.status,
                action: "sell",
            });
        }
        self.status = ListingState::Sold;
        self.sold_at = Some(at);
        Ok(())
    }

    /// Removes the listing from the marketplace.
    pub fn remove(&mut self, reason: RemovalReason) -> Result<(), ListingError> {
        if !self.status.can_remove() {
            return Err(ListingError::InvalidTransition {
                current: self.status,
                action: "remove",
            });
        }
        self.status = ListingState::Removed;
        self.removal_reason = Some(reason);
        Ok(())
    }
}
