//! Negotiation engine: inquiries, offers, counter-offers, and the
//! accept/reject/withdraw/expire transitions.

use chrono::{DateTime, Duration, Utc};
use common::{ListingId, OfferId, UserId};
use domain::{Listing, ListingState, Money, Offer};
use store::{MarketplaceStore, StoreSession};

use crate::error::MarketplaceError;
use crate::services::notify::{self, MarketEvent, NotificationAdapter};
use crate::sync;

/// Default offer TTL.
const DEFAULT_OFFER_TTL_DAYS: i64 = 7;

/// Result of one expiry sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Offers transitioned to `Expired`.
    pub offers_expired: usize,
    /// Reserved listings returned to `Available` because their accepted
    /// offer lapsed.
    pub listings_released: usize,
}

/// Service owning the per-listing negotiation state machine.
pub struct NegotiationService<S, N> {
    store: S,
    notifier: N,
    ttl: Duration,
}

impl<S, N> NegotiationService<S, N>
where
    S: MarketplaceStore,
    N: NotificationAdapter,
{
    /// Creates a negotiation service with the default 7-day offer TTL.
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            ttl: Duration::days(DEFAULT_OFFER_TTL_DAYS),
        }
    }

    /// Overrides the offer TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn available_listing(
        session: &mut S::Session,
        listing_id: ListingId,
    ) -> Result<Listing, MarketplaceError> {
        let listing =
            session
                .listing(listing_id)
                .await?
                .ok_or(MarketplaceError::NotFound {
                    what: "listing",
                    id: listing_id.to_string(),
                })?;
        if listing.status != ListingState::Available {
            return Err(MarketplaceError::not_available(format!(
                "listing is {}",
                listing.status
            )));
        }
        Ok(listing)
    }

    /// Creates a pending price offer on an available listing.
    #[tracing::instrument(skip(self, message))]
    pub async fn make_offer(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
        amount: Money,
        message: Option<String>,
    ) -> Result<Offer, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let listing = Self::available_listing(&mut session, listing_id).await?;

        let now = Utc::now();
        let offer = Offer::new_offer(
            OfferId::new(),
            &listing,
            buyer_id,
            amount,
            message,
            now,
            self.ttl,
        )?;
        session.insert_offer(&offer).await?;
        session.commit().await?;

        metrics::counter!("marketplace_offers_created").increment(1);
        notify::best_effort(
            &self.notifier,
            listing.seller_id,
            MarketEvent::OfferReceived,
            serde_json::json!({ "offer_id": offer.id, "listing_id": listing_id, "amount": amount }),
        )
        .await;

        Ok(offer)
    }

    /// Creates a plain inquiry (no amount) on an available listing.
    #[tracing::instrument(skip(self, message))]
    pub async fn make_inquiry(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
        message: Option<String>,
    ) -> Result<Offer, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let listing = Self::available_listing(&mut session, listing_id).await?;

        let now = Utc::now();
        let inquiry = Offer::new_inquiry(OfferId::new(), &listing, buyer_id, message, now, self.ttl)?;
        session.insert_offer(&inquiry).await?;
        session.commit().await?;

        notify::best_effort(
            &self.notifier,
            listing.seller_id,
            MarketEvent::OfferReceived,
            serde_json::json!({ "offer_id": inquiry.id, "listing_id": listing_id }),
        )
        .await;

        Ok(inquiry)
    }

    /// Counters a pending offer: a new counter-offer row supersedes it,
    /// preserving the negotiation history.
    #[tracing::instrument(skip(self, message))]
    pub async fn counter_offer(
        &self,
        offer_id: OfferId,
        actor_id: UserId,
        new_amount: Money,
        message: Option<String>,
    ) -> Result<Offer, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let mut previous =
            session
                .offer(offer_id)
                .await?
                .ok_or(MarketplaceError::NotFound {
                    what: "offer",
                    id: offer_id.to_string(),
                })?;

        Self::available_listing(&mut session, previous.listing_id).await?;

        let now = Utc::now();
        let counter = previous.counter(OfferId::new(), actor_id, new_amount, message, now, self.ttl)?;
        previous.mark_countered(now)?;

        session.update_offer(&previous).await?;
        session.insert_offer(&counter).await?;
        session.commit().await?;

        metrics::counter!("marketplace_offers_countered").increment(1);
        let recipient = if counter.author_id == counter.buyer_id {
            counter.seller_id
        } else {
            counter.buyer_id
        };
        notify::best_effort(
            &self.notifier,
            recipient,
            MarketEvent::OfferCountered,
            serde_json::json!({
                "offer_id": counter.id,
                "listing_id": counter.listing_id,
                "amount": new_amount,
            }),
        )
        .await;

        Ok(counter)
    }

    /// Accepts an open offer: the offer becomes `Accepted`, every other
    /// open offer on the listing is auto-rejected (first accept wins),
    /// and the listing moves `Available → Reserved`.
    #[tracing::instrument(skip(self))]
    pub async fn accept_offer(
        &self,
        offer_id: OfferId,
        actor_id: UserId,
    ) -> Result<Offer, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let mut offer = session
            .offer(offer_id)
            .await?
            .ok_or(MarketplaceError::NotFound {
                what: "offer",
                id: offer_id.to_string(),
            })?;

        let mut listing = session
            .listing_for_update(offer.listing_id)
            .await?
            .ok_or(MarketplaceError::NotFound {
                what: "listing",
                id: offer.listing_id.to_string(),
            })?;

        if listing.status != ListingState::Available {
            let reason = match listing.status {
                ListingState::Sold => "someone else completed this sale".to_string(),
                ListingState::Reserved => "another offer was already accepted".to_string(),
                other => format!("listing is {other}"),
            };
            return Err(MarketplaceError::not_available(reason));
        }

        let now = Utc::now();
        offer.accept(actor_id, now)?;

        // Tie-break: the rest of the open offers lose.
        let mut losers = Vec::new();
        for mut other in session.open_offers_for_listing(listing.id).await? {
            if other.id == offer.id {
                continue;
            }
            other.force_reject(now)?;
            session.update_offer(&other).await?;
            losers.push(other.buyer_id);
        }

        listing.reserve()?;
        session.update_offer(&offer).await?;
        session.update_listing(&listing).await?;
        sync::reserve_coverage(&mut session, &listing).await?;
        session.commit().await?;

        metrics::counter!("marketplace_offers_accepted").increment(1);
        tracing::info!(offer_id = %offer.id, listing_id = %listing.id, "offer accepted");

        let accepted_recipient = if actor_id == offer.buyer_id {
            offer.seller_id
        } else {
            offer.buyer_id
        };
        notify::best_effort(
            &self.notifier,
            accepted_recipient,
            MarketEvent::OfferAccepted,
            serde_json::json!({ "offer_id": offer.id, "listing_id": listing.id }),
        )
        .await;
        for buyer_id in losers {
            notify::best_effort(
                &self.notifier,
                buyer_id,
                MarketEvent::OfferRejected,
                serde_json::json!({
                    "listing_id": listing.id,
                    "reason": "another offer was accepted",
                }),
            )
            .await;
        }

        Ok(offer)
    }

    /// Rejects an open offer. Terminal; no side effect on the listing.
    #[tracing::instrument(skip(self))]
    pub async fn reject_offer(
        &self,
        offer_id: OfferId,
        actor_id: UserId,
    ) -> Result<Offer, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let mut offer = session
            .offer(offer_id)
            .await?
            .ok_or(MarketplaceError::NotFound {
                what: "offer",
                id: offer_id.to_string(),
            })?;

        let now = Utc::now();
        offer.reject(actor_id, now)?;
        session.update_offer(&offer).await?;
        session.commit().await?;

        notify::best_effort(
            &self.notifier,
            offer.author_id,
            MarketEvent::OfferRejected,
            serde_json::json!({ "offer_id": offer.id, "listing_id": offer.listing_id }),
        )
        .await;

        Ok(offer)
    }

    /// Withdraws an offer by its author. Terminal; no side effect on the
    /// listing.
    #[tracing::instrument(skip(self))]
    pub async fn withdraw_offer(
        &self,
        offer_id: OfferId,
        actor_id: UserId,
    ) -> Result<Offer, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let mut offer = session
            .offer(offer_id)
            .await?
            .ok_or(MarketplaceError::NotFound {
                what: "offer",
                id: offer_id.to_string(),
            })?;

        let now = Utc::now();
        offer.withdraw(actor_id, now)?;
        session.update_offer(&offer).await?;
        session.commit().await?;

        let counterparty = if offer.author_id == offer.buyer_id {
            offer.seller_id
        } else {
            offer.buyer_id
        };
        notify::best_effort(
            &self.notifier,
            counterparty,
            MarketEvent::OfferWithdrawn,
            serde_json::json!({ "offer_id": offer.id, "listing_id": offer.listing_id }),
        )
        .await;

        Ok(offer)
    }

    /// Loads a single offer.
    #[tracing::instrument(skip(self))]
    pub async fn get_offer(&self, offer_id: OfferId) -> Result<Offer, MarketplaceError> {
        let mut session = self.store.begin().await?;
        session
            .offer(offer_id)
            .await?
            .ok_or(MarketplaceError::NotFound {
                what: "offer",
                id: offer_id.to_string(),
            })
    }

    /// The expiry sweep: lapses every stale pending/countered offer, and
    /// releases listings whose accepted offer lapsed without a sale.
    ///
    /// Advisory housekeeping, run periodically, outside request
    /// handling.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale_offers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let mut report = SweepReport::default();
        let mut expired_authors = Vec::new();

        for mut offer in session.offers_expiring_before(now).await? {
            let was_accepted = offer.status == domain::OfferStatus::Accepted;
            offer.expire(now)?;
            session.update_offer(&offer).await?;
            report.offers_expired += 1;
            expired_authors.push((offer.author_id, offer.id));

            if was_accepted {
                // The reservation existed solely because of this offer;
                // give the listing back to the market.
                if let Some(mut listing) = session.listing_for_update(offer.listing_id).await?
                    && listing.status == ListingState::Reserved
                {
                    listing.unreserve()?;
                    session.update_listing(&listing).await?;
                    sync::release_coverage(&mut session, &listing).await?;
                    report.listings_released += 1;
                }
            }
        }

        session.commit().await?;

        if report.offers_expired > 0 {
            metrics::counter!("marketplace_offers_expired")
                .increment(report.offers_expired as u64);
            tracing::info!(
                expired = report.offers_expired,
                released = report.listings_released,
                "offer expiry sweep"
            );
        }

        for (author_id, offer_id) in expired_authors {
            notify::best_effort(
                &self.notifier,
                author_id,
                MarketEvent::OfferExpired,
                serde_json::json!({ "offer_id": offer_id }),
            )
            .await;
        }

        Ok(report)
    }
}
