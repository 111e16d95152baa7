//! Sale finalization endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use chrono::NaiveDate;
use common::{ListingId, UserId};
use domain::Money;
use marketplace::{SaleOutcome, SaleRequest};
use serde::{Deserialize, Serialize};
use store::MarketplaceStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::actor_id;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSaleRequest {
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub final_price: i64,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    /// Pickup date (`dateRecuperation` on the wire).
    pub date_recuperation: Option<NaiveDate>,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSaleResponse {
    pub success: bool,
    pub transaction: TransactionSummary,
    pub cleanup: CleanupSummary,
    pub finance: FinanceSummary,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub id: String,
    pub amount: i64,
    pub seller_id: String,
    pub buyer_id: String,
    pub listing: ListingSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    pub id: String,
    pub listing_type: String,
    pub subject_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub listings_removed: usize,
    pub listings_updated: usize,
    pub subjects_updated: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceSummary {
    pub revenue_id: String,
    pub amount: i64,
}

impl From<&SaleOutcome> for CompleteSaleResponse {
    fn from(outcome: &SaleOutcome) -> Self {
        let transaction = &outcome.transaction;
        Self {
            success: true,
            transaction: TransactionSummary {
                id: transaction.id.to_string(),
                amount: transaction.final_price.minor(),
                seller_id: transaction.seller_id.to_string(),
                buyer_id: transaction.buyer_id.to_string(),
                listing: ListingSummary {
                    id: transaction.listing_id.to_string(),
                    listing_type: outcome.listing_type.to_string(),
                    subject_ids: transaction
                        .subject_ids
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                },
            },
            cleanup: CleanupSummary {
                listings_removed: outcome.cleanup.listings_removed,
                listings_updated: outcome.cleanup.listings_updated,
                subjects_updated: outcome.cleanup.subjects_updated,
            },
            finance: FinanceSummary {
                revenue_id: outcome.ledger.entry_id.clone(),
                amount: outcome.ledger.amount.minor(),
            },
            message: outcome.message.clone(),
        }
    }
}

// -- Handlers --

/// POST /marketplace/sales/complete — finalize a reserved sale.
///
/// Idempotent: replaying the call for an already-sold listing returns
/// the recorded transaction with 200, so client retries are safe.
#[tracing::instrument(skip(state, headers, req))]
pub async fn complete<S: MarketplaceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CompleteSaleRequest>,
) -> Result<Json<CompleteSaleResponse>, ApiError> {
    let seller_id = actor_id(&headers)?;

    let outcome = state
        .finalizer
        .complete_sale(SaleRequest {
            listing_id: ListingId::from_uuid(req.listing_id),
            buyer_id: UserId::from_uuid(req.buyer_id),
            seller_id,
            final_price: Money::from_minor(req.final_price),
            payment_method: req.payment_method.or_else(|| Some("cash".to_string())),
            notes: req.notes,
            pickup_date: req.date_recuperation,
        })
        .await?;

    Ok(Json(CompleteSaleResponse::from(&outcome)))
}
