use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BatchId, ListingId, OfferId, SubjectId};
use domain::{BatchAggregate, Listing, Offer, SaleTransaction, SubjectProjection};

use crate::Result;

/// A store that can open transactional sessions.
///
/// Implementations must be cheap to clone (pool/handle semantics) so
/// services can each hold one.
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    /// The session type this store produces.
    type Session: StoreSession + 'static;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Session>;
}

/// One transaction against the marketplace state.
///
/// All reads and writes go through a session; nothing is visible to other
/// sessions until [`StoreSession::commit`]. Dropping a session without
/// committing aborts it; no partial state is ever observable.
///
/// `*_for_update` methods lock the touched rows for the remainder of the
/// session (`SELECT ... FOR UPDATE` semantics). Subject projections are
/// locked as a set in ascending id order to keep lock acquisition
/// deadlock-free across overlapping batches.
#[async_trait]
pub trait StoreSession: Send {
    /// Commits the transaction, making all writes visible atomically.
    async fn commit(self) -> Result<()>;

    /// Aborts the transaction explicitly. Equivalent to dropping the
    /// session.
    async fn rollback(self) -> Result<()>;

    // -- Listings --

    async fn insert_listing(&mut self, listing: &Listing) -> Result<()>;

    async fn listing(&mut self, id: ListingId) -> Result<Option<Listing>>;

    /// Reads a listing and locks its row until the session ends.
    async fn listing_for_update(&mut self, id: ListingId) -> Result<Option<Listing>>;

    async fn update_listing(&mut self, listing: &Listing) -> Result<()>;

    /// Batch fetch preserving request order; unknown ids are omitted.
    async fn listings_by_ids(&mut self, ids: &[ListingId]) -> Result<Vec<Listing>>;

    /// Every non-terminal listing covering any of the given subjects,
    /// either directly or through the subject's batch. `exclude` filters
    /// out the caller's own listing.
    async fn active_listings_for_subjects(
        &mut self,
        subjects: &[SubjectId],
        exclude: Option<ListingId>,
    ) -> Result<Vec<Listing>>;

    // -- Offers --

    async fn insert_offer(&mut self, offer: &Offer) -> Result<()>;

    async fn offer(&mut self, id: OfferId) -> Result<Option<Offer>>;

    async fn update_offer(&mut self, offer: &Offer) -> Result<()>;

    /// Pending and countered offers on a listing, oldest first.
    async fn open_offers_for_listing(&mut self, listing_id: ListingId) -> Result<Vec<Offer>>;

    /// Offers holding `Accepted` on a listing. The single-accepted
    /// invariant makes more than one element an anomaly the caller must
    /// treat as such.
    async fn accepted_offers_for_listing(&mut self, listing_id: ListingId) -> Result<Vec<Offer>>;

    /// Expirable offers (pending, countered, or accepted) whose TTL
    /// lapsed at or before the cutoff.
    async fn offers_expiring_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<Offer>>;

    // -- Sales --

    async fn insert_sale(&mut self, sale: &SaleTransaction) -> Result<()>;

    /// The sale recorded for a listing, if finalization completed.
    async fn sale_for_listing(&mut self, listing_id: ListingId) -> Result<Option<SaleTransaction>>;

    // -- Subject registry projections --

    /// Creates the projection row for a subject known to the registry.
    /// Idempotent: an existing projection is left untouched.
    async fn register_subject(
        &mut self,
        subject_id: SubjectId,
        batch_id: Option<BatchId>,
    ) -> Result<()>;

    async fn subject(&mut self, id: SubjectId) -> Result<Option<SubjectProjection>>;

    /// Reads and locks a set of projections in ascending id order.
    async fn subjects_for_update(
        &mut self,
        ids: &[SubjectId],
    ) -> Result<Vec<SubjectProjection>>;

    async fn upsert_subject(&mut self, projection: &SubjectProjection) -> Result<()>;

    /// Ids of every subject belonging to a batch, ascending.
    async fn batch_members(&mut self, batch_id: BatchId) -> Result<Vec<SubjectId>>;

    async fn batch_aggregate(&mut self, batch_id: BatchId) -> Result<Option<BatchAggregate>>;

    async fn upsert_batch_aggregate(&mut self, aggregate: &BatchAggregate) -> Result<()>;
}
