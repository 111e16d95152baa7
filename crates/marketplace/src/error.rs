//! Engine error taxonomy.

use common::SubjectId;
use domain::{ListingError, OfferError};
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the marketplace engine.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// Bad input shape or range (non-positive weight, oversized batch
    /// fetch, negative amount, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// One or more subjects are already covered by a non-terminal
    /// listing, or were already sold.
    #[error("subjects already carry an active or completed listing: {subject_ids:?}")]
    DuplicateActiveListing { subject_ids: Vec<SubjectId> },

    /// A buyer attempted to negotiate on their own listing.
    #[error("you cannot buy your own listing")]
    SelfPurchaseForbidden,

    /// The listing is in the wrong state for the requested operation.
    #[error("listing not available: {reason}")]
    ListingNotAvailable { reason: String },

    /// A listing state-machine violation.
    #[error(transparent)]
    Listing(ListingError),

    /// An offer state-machine or party violation.
    #[error(transparent)]
    Offer(OfferError),

    /// Unknown listing, offer, or subject.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// The actor is not the party this operation requires.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Lock contention persisted through the bounded retries.
    #[error("concurrent modification, retries exhausted")]
    ConcurrencyConflict,

    /// The downstream financial system rejected or never received the
    /// revenue entry; the whole finalization was rolled back.
    #[error("ledger write failed: {0}")]
    LedgerWriteFailed(String),

    /// Store infrastructure error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ListingError> for MarketplaceError {
    fn from(e: ListingError) -> Self {
        match e {
            ListingError::InvalidWeight | ListingError::InvalidPrice => {
                MarketplaceError::Validation(e.to_string())
            }
            other => MarketplaceError::Listing(other),
        }
    }
}

impl From<OfferError> for MarketplaceError {
    fn from(e: OfferError) -> Self {
        match e {
            OfferError::SelfPurchase => MarketplaceError::SelfPurchaseForbidden,
            OfferError::NegativeAmount => MarketplaceError::Validation(e.to_string()),
            OfferError::NotAParty | OfferError::NotCounterparty | OfferError::NotAuthor => {
                MarketplaceError::Forbidden(e.to_string())
            }
            other => MarketplaceError::Offer(other),
        }
    }
}

impl MarketplaceError {
    /// Shorthand for [`MarketplaceError::ListingNotAvailable`].
    pub fn not_available(reason: impl Into<String>) -> Self {
        MarketplaceError::ListingNotAvailable {
            reason: reason.into(),
        }
    }
}
