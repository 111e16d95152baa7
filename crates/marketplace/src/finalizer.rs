//! Sale finalizer: the atomic transition from an accepted offer to a
//! completed, ledgered sale.
//!
//! Everything (listing, subject projections, defensive cleanup, batch
//! aggregates, the sale record, and the ledger request) happens inside
//! one store session. If any step fails, the session is dropped and no
//! partial state is observable: a sold subject with no ledger entry, or
//! a ledger entry with no completed listing, cannot exist.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use common::{ListingId, TransactionId, UserId};
use domain::{Listing, ListingState, Money, RemovalReason, SaleTransaction};
use serde::Serialize;
use store::{MarketplaceStore, StoreError, StoreSession};

use crate::error::MarketplaceError;
use crate::services::ledger::LedgerAdapter;
use crate::services::notify::{self, MarketEvent, NotificationAdapter};
use crate::sync;

/// Bounded retries for lock-contention failures.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// Input to [`SaleFinalizer::complete_sale`].
#[derive(Debug, Clone)]
pub struct SaleRequest {
    pub listing_id: ListingId,
    /// The buyer the accepted offer must belong to.
    pub buyer_id: UserId,
    /// The acting seller.
    pub seller_id: UserId,
    pub final_price: Money,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub pickup_date: Option<NaiveDate>,
}

/// What the defensive cleanup touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Other listings force-removed because they referenced a sold
    /// subject.
    pub listings_removed: usize,
    /// Other listings rewritten without removal. The uniqueness
    /// invariant makes this zero in a healthy store.
    pub listings_updated: usize,
    /// Subject projections marked sold.
    pub subjects_updated: usize,
}

/// Reference to the ledger entry recorded for a sale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRef {
    pub entry_id: String,
    pub amount: Money,
}

/// Result of a completed (or replayed) sale.
#[derive(Debug, Clone)]
pub struct SaleOutcome {
    pub transaction: SaleTransaction,
    /// `"individual"` or `"batch"`.
    pub listing_type: &'static str,
    pub cleanup: CleanupReport,
    pub ledger: LedgerRef,
    /// True when this call was an idempotent replay of an already
    /// finalized sale.
    pub replayed: bool,
    pub message: String,
}

/// Service orchestrating sale finalization.
pub struct SaleFinalizer<S, L, N> {
    store: S,
    ledger: L,
    notifier: N,
}

impl<S, L, N> SaleFinalizer<S, L, N>
where
    S: MarketplaceStore,
    L: LedgerAdapter,
    N: NotificationAdapter,
{
    /// Creates a new finalizer.
    pub fn new(store: S, ledger: L, notifier: N) -> Self {
        Self {
            store,
            ledger,
            notifier,
        }
    }

    /// Finalizes the sale of a reserved listing.
    ///
    /// Preconditions (checked before any mutation): the listing exists
    /// and is `Reserved`, exactly one accepted offer exists and belongs
    /// to `buyer_id`, the actor is the seller, and buyer ≠ seller.
    ///
    /// Calling this again for a listing already sold to the same buyer
    /// is an idempotent replay: it returns the recorded transaction and
    /// the existing ledger entry, so client retries after a timeout are
    /// safe.
    #[tracing::instrument(skip(self, request), fields(listing_id = %request.listing_id))]
    pub async fn complete_sale(
        &self,
        request: SaleRequest,
    ) -> Result<SaleOutcome, MarketplaceError> {
        if request.final_price.is_negative() {
            return Err(MarketplaceError::Validation(
                "final price must not be negative".to_string(),
            ));
        }
        if request.buyer_id == request.seller_id {
            return Err(MarketplaceError::SelfPurchaseForbidden);
        }

        let start = std::time::Instant::now();
        let mut attempt = 0;
        let outcome = loop {
            match self.try_complete(&request).await {
                Err(MarketplaceError::Store(StoreError::ConcurrencyConflict(reason))) => {
                    attempt += 1;
                    if attempt > MAX_CONFLICT_RETRIES {
                        tracing::warn!(%reason, "finalize retries exhausted");
                        return Err(MarketplaceError::ConcurrencyConflict);
                    }
                    tracing::debug!(%reason, attempt, "finalize lock conflict, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(25 * attempt as u64))
                        .await;
                }
                other => break other?,
            }
        };

        metrics::histogram!("marketplace_finalize_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        if !outcome.replayed {
            metrics::counter!("marketplace_sales_completed").increment(1);
            tracing::info!(
                transaction_id = %outcome.transaction.id,
                subjects = outcome.transaction.subject_ids.len(),
                "sale completed"
            );

            let payload = serde_json::json!({
                "transaction_id": outcome.transaction.id,
                "listing_id": outcome.transaction.listing_id,
                "final_price": outcome.transaction.final_price,
                "subject_count": outcome.transaction.subject_ids.len(),
            });
            notify::best_effort(
                &self.notifier,
                outcome.transaction.seller_id,
                MarketEvent::ListingSold,
                payload.clone(),
            )
            .await;
            notify::best_effort(
                &self.notifier,
                outcome.transaction.buyer_id,
                MarketEvent::PurchaseConfirmed,
                payload,
            )
            .await;
        }

        Ok(outcome)
    }

    async fn try_complete(&self, request: &SaleRequest) -> Result<SaleOutcome, MarketplaceError> {
        let mut session = self.store.begin().await?;
        let now = Utc::now();

        let mut listing = session
            .listing_for_update(request.listing_id)
            .await?
            .ok_or(MarketplaceError::NotFound {
                what: "listing",
                id: request.listing_id.to_string(),
            })?;

        if listing.seller_id != request.seller_id {
            return Err(MarketplaceError::Forbidden(
                "only the seller may complete this sale".to_string(),
            ));
        }

        if listing.status == ListingState::Sold {
            return self.replay(&mut session, &listing, request).await;
        }

        if listing.status != ListingState::Reserved {
            return Err(MarketplaceError::not_available(format!(
                "listing is {}, expected reserved",
                listing.status
            )));
        }

        let accepted = session
            .accepted_offers_for_listing(listing.id)
            .await?;
        let offer = match accepted.as_slice() {
            [offer] => offer,
            [] => {
                return Err(MarketplaceError::not_available(
                    "no accepted offer on this listing",
                ));
            }
            _ => {
                // Invariant breach; refuse rather than guess a winner.
                return Err(MarketplaceError::not_available(
                    "multiple accepted offers on this listing",
                ));
            }
        };
        if offer.buyer_id != request.buyer_id {
            return Err(MarketplaceError::not_available(
                "the accepted offer belongs to a different buyer",
            ));
        }

        // Step 1: the listing itself.
        listing.mark_sold(now)?;
        session.update_listing(&listing).await?;

        // Step 2: subject projections, locked as a sorted set.
        let subject_ids = sync::covered_subjects(&mut session, &listing.target).await?;
        let mut cleanup = CleanupReport::default();
        let mut touched_batches = BTreeSet::new();
        for mut projection in session.subjects_for_update(&subject_ids).await? {
            projection.mark_sold(now);
            if let Some(batch_id) = projection.batch_id {
                touched_batches.insert(batch_id);
            }
            session.upsert_subject(&projection).await?;
            cleanup.subjects_updated += 1;
        }

        // Defensive: force out any other listing still referencing one of
        // the sold subjects. The uniqueness invariant says there are
        // none, but a sold subject must never stay purchasable.
        let conflicting = session
            .active_listings_for_subjects(&subject_ids, Some(listing.id))
            .await?;
        for mut other in conflicting {
            for mut stale in session.open_offers_for_listing(other.id).await? {
                stale.force_reject(now)?;
                session.update_offer(&stale).await?;
            }
            for mut stale in session.accepted_offers_for_listing(other.id).await? {
                stale.force_reject(now)?;
                session.update_offer(&stale).await?;
            }
            other.remove(RemovalReason::SubjectSoldElsewhere)?;
            session.update_listing(&other).await?;
            if let Some(batch_id) = other.target.batch_id() {
                touched_batches.insert(batch_id);
            }
            cleanup.listings_removed += 1;
        }

        // Step 3: batch aggregates, inside the same transaction.
        for batch_id in touched_batches {
            sync::resync_batch(&mut session, batch_id).await?;
        }

        // Step 4: the immutable sale record.
        let transaction = SaleTransaction {
            id: TransactionId::new(),
            listing_id: listing.id,
            offer_id: offer.id,
            buyer_id: request.buyer_id,
            seller_id: request.seller_id,
            farm_id: listing.farm_id,
            subject_ids: subject_ids.clone(),
            final_price: request.final_price,
            payment_method: request.payment_method.clone(),
            notes: request.notes.clone(),
            pickup_date: request.pickup_date,
            created_at: now,
        };
        session.insert_sale(&transaction).await?;

        // Step 5: the ledger entry. A failure here aborts the whole
        // session: money and inventory move together or not at all.
        let entry_id = self
            .ledger
            .record_revenue(
                transaction.id,
                listing.farm_id,
                request.final_price,
                &sale_description(&listing, subject_ids.len()),
            )
            .await
            .map_err(|e| MarketplaceError::LedgerWriteFailed(e.to_string()))?;

        session.commit().await?;

        Ok(SaleOutcome {
            message: format!(
                "sale of {} subject(s) completed",
                transaction.subject_ids.len()
            ),
            listing_type: listing.target.kind_str(),
            transaction,
            cleanup,
            ledger: LedgerRef {
                entry_id,
                amount: request.final_price,
            },
            replayed: false,
        })
    }

    /// Idempotent replay path for a listing already sold.
    async fn replay(
        &self,
        session: &mut S::Session,
        listing: &Listing,
        request: &SaleRequest,
    ) -> Result<SaleOutcome, MarketplaceError> {
        let transaction = session
            .sale_for_listing(listing.id)
            .await?
            .ok_or_else(|| {
                MarketplaceError::not_available("listing was sold outside the marketplace")
            })?;

        if transaction.buyer_id != request.buyer_id {
            return Err(MarketplaceError::not_available(
                "someone else completed this sale",
            ));
        }

        // The ledger request is idempotent by transaction id, so this
        // returns the existing entry.
        let entry_id = self
            .ledger
            .record_revenue(
                transaction.id,
                transaction.farm_id,
                transaction.final_price,
                &sale_description(listing, transaction.subject_ids.len()),
            )
            .await
            .map_err(|e| MarketplaceError::LedgerWriteFailed(e.to_string()))?;

        tracing::info!(transaction_id = %transaction.id, "sale replayed idempotently");

        Ok(SaleOutcome {
            message: "sale already completed".to_string(),
            listing_type: listing.target.kind_str(),
            ledger: LedgerRef {
                entry_id,
                amount: transaction.final_price,
            },
            transaction,
            cleanup: CleanupReport::default(),
            replayed: true,
        })
    }
}

fn sale_description(listing: &Listing, subject_count: usize) -> String {
    format!(
        "marketplace sale - {subject_count} subject(s){}",
        if listing.target.batch_id().is_some() {
            " (batch)"
        } else {
            ""
        }
    )
}
