use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BatchId, ListingId, OfferId, SubjectId, TransactionId};
use domain::{BatchAggregate, Listing, Offer, SaleTransaction, SubjectProjection};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{MarketplaceStore, StoreSession};
use crate::Result;

#[derive(Default, Clone)]
struct StoreState {
    listings: HashMap<ListingId, Listing>,
    offers: HashMap<OfferId, Offer>,
    sales: HashMap<TransactionId, SaleTransaction>,
    subjects: BTreeMap<SubjectId, SubjectProjection>,
    batches: HashMap<BatchId, BatchAggregate>,
}

/// In-memory store for tests and single-node development.
///
/// A session takes the single writer lock for its whole lifetime and
/// works on a snapshot, swapping it back in on commit. That is a coarse
/// stand-in for row-level locks, but strictly stronger: sessions are
/// fully serialized, so the observable semantics match the PostgreSQL
/// implementation: at most one finalize in flight per listing, and a
/// dropped session leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subject projection outside any engine operation.
    ///
    /// The subject registry is an external collaborator; tests and local
    /// setups use this to stand in for it.
    pub async fn seed_subject(&self, subject_id: SubjectId, batch_id: Option<BatchId>) {
        let mut state = self.state.lock().await;
        state
            .subjects
            .entry(subject_id)
            .or_insert_with(|| SubjectProjection::unlisted(subject_id, batch_id));
    }

    /// Returns the number of stored listings.
    pub async fn listing_count(&self) -> usize {
        self.state.lock().await.listings.len()
    }

    /// Returns the number of stored offers.
    pub async fn offer_count(&self) -> usize {
        self.state.lock().await.offers.len()
    }

    /// Returns the number of recorded sales.
    pub async fn sale_count(&self) -> usize {
        self.state.lock().await.sales.len()
    }
}

/// A transaction against the in-memory store.
pub struct InMemorySession {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
}

#[async_trait]
impl MarketplaceStore for InMemoryStore {
    type Session = InMemorySession;

    async fn begin(&self) -> Result<Self::Session> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemorySession { guard, working })
    }
}

impl InMemorySession {
    fn subject_batch(&self, subject_id: SubjectId) -> Option<BatchId> {
        self.working
            .subjects
            .get(&subject_id)
            .and_then(|p| p.batch_id)
    }

    fn listing_covers_any(&self, listing: &Listing, subjects: &[SubjectId]) -> bool {
        match listing.target {
            domain::ListingTarget::Individual { subject_id } => subjects.contains(&subject_id),
            domain::ListingTarget::Batch { batch_id } => subjects
                .iter()
                .any(|s| self.subject_batch(*s) == Some(batch_id)),
        }
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn commit(self) -> Result<()> {
        let InMemorySession { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }

    async fn insert_listing(&mut self, listing: &Listing) -> Result<()> {
        self.working.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn listing(&mut self, id: ListingId) -> Result<Option<Listing>> {
        Ok(self.working.listings.get(&id).cloned())
    }

    async fn listing_for_update(&mut self, id: ListingId) -> Result<Option<Listing>> {
        // The session already holds the single writer lock.
        Ok(self.working.listings.get(&id).cloned())
    }

    async fn update_listing(&mut self, listing: &Listing) -> Result<()> {
        self.working.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn listings_by_ids(&mut self, ids: &[ListingId]) -> Result<Vec<Listing>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.listings.get(id).cloned())
            .collect())
    }

    async fn active_listings_for_subjects(
        &mut self,
        subjects: &[SubjectId],
        exclude: Option<ListingId>,
    ) -> Result<Vec<Listing>> {
        let mut matches: Vec<Listing> = self
            .working
            .listings
            .values()
            .filter(|l| l.is_active() && Some(l.id) != exclude)
            .filter(|l| self.listing_covers_any(l, subjects))
            .cloned()
            .collect();
        matches.sort_by_key(|l| l.id);
        Ok(matches)
    }

    async fn insert_offer(&mut self, offer: &Offer) -> Result<()> {
        self.working.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn offer(&mut self, id: OfferId) -> Result<Option<Offer>> {
        Ok(self.working.offers.get(&id).cloned())
    }

    async fn update_offer(&mut self, offer: &Offer) -> Result<()> {
        self.working.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn open_offers_for_listing(&mut self, listing_id: ListingId) -> Result<Vec<Offer>> {
        let mut offers: Vec<Offer> = self
            .working
            .offers
            .values()
            .filter(|o| o.listing_id == listing_id && o.status.can_respond())
            .cloned()
            .collect();
        offers.sort_by_key(|o| o.created_at);
        Ok(offers)
    }

    async fn accepted_offers_for_listing(&mut self, listing_id: ListingId) -> Result<Vec<Offer>> {
        let mut offers: Vec<Offer> = self
            .working
            .offers
            .values()
            .filter(|o| o.listing_id == listing_id && o.status == domain::OfferStatus::Accepted)
            .cloned()
            .collect();
        offers.sort_by_key(|o| o.created_at);
        Ok(offers)
    }

    async fn offers_expiring_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<Offer>> {
        let mut offers: Vec<Offer> = self
            .working
            .offers
            .values()
            .filter(|o| o.status.can_expire() && o.expires_at <= cutoff)
            .cloned()
            .collect();
        offers.sort_by_key(|o| o.expires_at);
        Ok(offers)
    }

    async fn insert_sale(&mut self, sale: &SaleTransaction) -> Result<()> {
        self.working.sales.insert(sale.id, sale.clone());
        Ok(())
    }

    async fn sale_for_listing(&mut self, listing_id: ListingId) -> Result<Option<SaleTransaction>> {
        Ok(self
            .working
            .sales
            .values()
            .find(|s| s.listing_id == listing_id)
            .cloned())
    }

    async fn register_subject(
        &mut self,
        subject_id: SubjectId,
        batch_id: Option<BatchId>,
    ) -> Result<()> {
        self.working
            .subjects
            .entry(subject_id)
            .or_insert_with(|| SubjectProjection::unlisted(subject_id, batch_id));
        Ok(())
    }

    async fn subject(&mut self, id: SubjectId) -> Result<Option<SubjectProjection>> {
        Ok(self.working.subjects.get(&id).cloned())
    }

    async fn subjects_for_update(&mut self, ids: &[SubjectId]) -> Result<Vec<SubjectProjection>> {
        let mut sorted: Vec<SubjectId> = ids.to_vec();
        sorted.sort();
        sorted.dedup();
        Ok(sorted
            .into_iter()
            .filter_map(|id| self.working.subjects.get(&id).cloned())
            .collect())
    }

    async fn upsert_subject(&mut self, projection: &SubjectProjection) -> Result<()> {
        self.working
            .subjects
            .insert(projection.subject_id, projection.clone());
        Ok(())
    }

    async fn batch_members(&mut self, batch_id: BatchId) -> Result<Vec<SubjectId>> {
        Ok(self
            .working
            .subjects
            .values()
            .filter(|p| p.batch_id == Some(batch_id))
            .map(|p| p.subject_id)
            .collect())
    }

    async fn batch_aggregate(&mut self, batch_id: BatchId) -> Result<Option<BatchAggregate>> {
        Ok(self.working.batches.get(&batch_id).cloned())
    }

    async fn upsert_batch_aggregate(&mut self, aggregate: &BatchAggregate) -> Result<()> {
        self.working
            .batches
            .insert(aggregate.batch_id, aggregate.clone());
        Ok(())
    }
}
