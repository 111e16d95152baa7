//! Listing store: creation, removal, batch fetch, and the internal
//! reserve/unreserve transitions.

use chrono::Utc;
use common::{FarmId, ListingId, SubjectId, UserId};
use domain::{Listing, ListingTarget, Money, SubjectMarketStatus};
use store::{MarketplaceStore, StoreSession};

use crate::error::MarketplaceError;
use crate::services::notify::{self, MarketEvent, NotificationAdapter};
use crate::sync;

/// Hard cap on `get_listings_by_ids` fan-out.
pub const MAX_DETAILS_BATCH: usize = 50;

/// Hard cap on photo references per listing.
const MAX_PHOTOS: usize = 10;

/// Input for listing creation.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub seller_id: UserId,
    pub farm_id: FarmId,
    pub target: ListingTarget,
    pub weight_kg: f64,
    pub price_per_kg: Money,
    pub photos: Vec<String>,
}

/// Service owning the listing lifecycle.
pub struct ListingService<S, N> {
    store: S,
    notifier: N,
}

impl<S, N> ListingService<S, N>
where
    S: MarketplaceStore,
    N: NotificationAdapter,
{
    /// Creates a new listing service.
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// Creates a listing covering one subject or a whole batch.
    ///
    /// Every covered subject must be known to the registry and free to
    /// be listed; otherwise the call fails with
    /// [`MarketplaceError::DuplicateActiveListing`] naming the blocked
    /// subjects.
    #[tracing::instrument(skip(self, input), fields(listing_type = input.target.kind_str()))]
    pub async fn create_listing(&self, input: NewListing) -> Result<Listing, MarketplaceError> {
        if input.photos.len() > MAX_PHOTOS {
            return Err(MarketplaceError::Validation(format!(
                "a listing carries at most {MAX_PHOTOS} photos"
            )));
        }

        let now = Utc::now();
        let listing = Listing::new(
            ListingId::new(),
            input.seller_id,
            input.farm_id,
            input.target,
            input.weight_kg,
            input.price_per_kg,
            input.photos,
            now,
        )?;

        let mut session = self.store.begin().await?;

        let subjects = sync::covered_subjects(&mut session, &listing.target).await?;
        if subjects.is_empty() {
            return Err(MarketplaceError::Validation(
                "batch has no members to list".to_string(),
            ));
        }

        let mut projections = Vec::with_capacity(subjects.len());
        let mut blocked: Vec<SubjectId> = Vec::new();
        for subject_id in &subjects {
            let projection = session.subject(*subject_id).await?.ok_or_else(|| {
                MarketplaceError::NotFound {
                    what: "subject",
                    id: subject_id.to_string(),
                }
            })?;
            if projection.status != SubjectMarketStatus::NotListed {
                blocked.push(*subject_id);
            }
            projections.push(projection);
        }

        // Defensive double check against surviving listing rows; the
        // projections are the authority but must agree with them.
        if blocked.is_empty() {
            let conflicting = session
                .active_listings_for_subjects(&subjects, None)
                .await?;
            for other in &conflicting {
                match other.target {
                    ListingTarget::Individual { subject_id } => blocked.push(subject_id),
                    ListingTarget::Batch { batch_id } => blocked.extend(
                        projections
                            .iter()
                            .filter(|p| p.batch_id == Some(batch_id))
                            .map(|p| p.subject_id),
                    ),
                }
            }
            blocked.sort();
            blocked.dedup();
        }

        if !blocked.is_empty() {
            return Err(MarketplaceError::DuplicateActiveListing {
                subject_ids: blocked,
            });
        }

        session.insert_listing(&listing).await?;
        sync::list_coverage(&mut session, &listing, now).await?;
        session.commit().await?;

        metrics::counter!("marketplace_listings_created").increment(1);
        tracing::info!(listing_id = %listing.id, "listing created");

        notify::best_effort(
            &self.notifier,
            listing.seller_id,
            MarketEvent::ListingCreated,
            serde_json::json!({
                "listing_id": listing.id,
                "calculated_price": listing.calculated_price(),
            }),
        )
        .await;

        Ok(listing)
    }

    /// Removes a listing. Seller-only; idempotent on an already-removed
    /// listing. Open offers on the listing are auto-rejected, and the
    /// covered subjects become listable again.
    #[tracing::instrument(skip(self))]
    pub async fn remove_listing(
        &self,
        id: ListingId,
        actor_id: UserId,
    ) -> Result<Listing, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let mut listing =
            session
                .listing_for_update(id)
                .await?
                .ok_or(MarketplaceError::NotFound {
                    what: "listing",
                    id: id.to_string(),
                })?;

        if listing.seller_id != actor_id {
            return Err(MarketplaceError::Forbidden(
                "only the seller may remove a listing".to_string(),
            ));
        }

        if listing.status == domain::ListingState::Removed {
            return Ok(listing);
        }

        let now = Utc::now();
        listing.remove(domain::RemovalReason::SellerRequest)?;

        let mut rejected_buyers = Vec::new();
        for mut offer in session.open_offers_for_listing(id).await? {
            offer.force_reject(now)?;
            session.update_offer(&offer).await?;
            rejected_buyers.push(offer.buyer_id);
        }
        for mut offer in session.accepted_offers_for_listing(id).await? {
            offer.force_reject(now)?;
            session.update_offer(&offer).await?;
            rejected_buyers.push(offer.buyer_id);
        }

        sync::clear_coverage(&mut session, &listing).await?;
        session.update_listing(&listing).await?;
        session.commit().await?;

        metrics::counter!("marketplace_listings_removed").increment(1);
        tracing::info!(listing_id = %id, "listing removed");

        for buyer_id in rejected_buyers {
            notify::best_effort(
                &self.notifier,
                buyer_id,
                MarketEvent::OfferRejected,
                serde_json::json!({ "listing_id": id, "reason": "listing_removed" }),
            )
            .await;
        }

        Ok(listing)
    }

    /// Batch fetch, capped at [`MAX_DETAILS_BATCH`] ids. Unknown ids are
    /// silently omitted; the result follows the request order.
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn get_listings_by_ids(
        &self,
        ids: &[ListingId],
    ) -> Result<Vec<Listing>, MarketplaceError> {
        if ids.is_empty() || ids.len() > MAX_DETAILS_BATCH {
            return Err(MarketplaceError::Validation(format!(
                "listing batch fetch takes between 1 and {MAX_DETAILS_BATCH} ids, got {}",
                ids.len()
            )));
        }

        let mut session = self.store.begin().await?;
        let listings = session.listings_by_ids(ids).await?;
        Ok(listings)
    }

    /// Loads a single listing.
    #[tracing::instrument(skip(self))]
    pub async fn get_listing(&self, id: ListingId) -> Result<Listing, MarketplaceError> {
        let mut session = self.store.begin().await?;
        session
            .listing(id)
            .await?
            .ok_or(MarketplaceError::NotFound {
                what: "listing",
                id: id.to_string(),
            })
    }

    /// Internal transition: `Available → Reserved`. Any other source
    /// state fails with an invalid-transition error.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, id: ListingId) -> Result<Listing, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let mut listing =
            session
                .listing_for_update(id)
                .await?
                .ok_or(MarketplaceError::NotFound {
                    what: "listing",
                    id: id.to_string(),
                })?;
        listing.reserve()?;
        session.update_listing(&listing).await?;
        sync::reserve_coverage(&mut session, &listing).await?;
        session.commit().await?;
        Ok(listing)
    }

    /// Internal transition: `Reserved → Available`. Any other source
    /// state fails with an invalid-transition error.
    #[tracing::instrument(skip(self))]
    pub async fn unreserve(&self, id: ListingId) -> Result<Listing, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let mut listing =
            session
                .listing_for_update(id)
                .await?
                .ok_or(MarketplaceError::NotFound {
                    what: "listing",
                    id: id.to_string(),
                })?;
        listing.unreserve()?;
        session.update_listing(&listing).await?;
        sync::release_coverage(&mut session, &listing).await?;
        session.commit().await?;
        Ok(listing)
    }
}
