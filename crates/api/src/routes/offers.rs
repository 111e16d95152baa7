//! Negotiation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use common::{ListingId, OfferId};
use domain::{Money, Offer};
use serde::{Deserialize, Serialize};
use store::MarketplaceStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::actor_id;

// -- Request types --

/// One negotiation event. `type` selects the action:
/// `inquiry` and `offer` create a message on a listing; `accept`,
/// `reject`, and `withdraw` respond to an existing offer.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferActionRequest {
    #[serde(rename = "type")]
    pub action: String,
    pub listing_id: Option<Uuid>,
    pub offer_id: Option<Uuid>,
    pub amount: Option<i64>,
    pub message: Option<String>,
}

/// Counter-offer body. The price travels as `nouveau_prix_total`.
#[derive(Deserialize)]
pub struct CounterOfferRequest {
    #[serde(rename = "offerId")]
    pub offer_id: Uuid,
    pub nouveau_prix_total: i64,
    pub message: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferResponse {
    pub id: String,
    pub listing_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_of: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<String>,
    pub expires_at: String,
}

impl From<&Offer> for OfferResponse {
    fn from(offer: &Offer) -> Self {
        Self {
            id: offer.id.to_string(),
            listing_id: offer.listing_id.to_string(),
            buyer_id: offer.buyer_id.to_string(),
            seller_id: offer.seller_id.to_string(),
            kind: offer.kind.as_str().to_string(),
            amount: offer.amount.map(|a| a.minor()),
            status: offer.status.to_string(),
            message: offer.message.clone(),
            counter_of: offer.counter_of.map(|id| id.to_string()),
            created_at: offer.created_at.to_rfc3339(),
            responded_at: offer.responded_at.map(|t| t.to_rfc3339()),
            expires_at: offer.expires_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /marketplace/offers — create or respond to negotiation events.
#[tracing::instrument(skip(state, headers, req), fields(action = %req.action))]
pub async fn act<S: MarketplaceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<OfferActionRequest>,
) -> Result<(StatusCode, Json<OfferResponse>), ApiError> {
    let actor = actor_id(&headers)?;

    let listing_id = || -> Result<ListingId, ApiError> {
        req.listing_id
            .map(ListingId::from_uuid)
            .ok_or_else(|| ApiError::BadRequest("listingId is required".to_string()))
    };
    let offer_id = || -> Result<OfferId, ApiError> {
        req.offer_id
            .map(OfferId::from_uuid)
            .ok_or_else(|| ApiError::BadRequest("offerId is required".to_string()))
    };

    let (status, offer) = match req.action.as_str() {
        "inquiry" => {
            let offer = state
                .negotiation
                .make_inquiry(listing_id()?, actor, req.message.clone())
                .await?;
            (StatusCode::CREATED, offer)
        }
        "offer" => {
            let amount = req
                .amount
                .ok_or_else(|| ApiError::BadRequest("amount is required".to_string()))?;
            let offer = state
                .negotiation
                .make_offer(
                    listing_id()?,
                    actor,
                    Money::from_minor(amount),
                    req.message.clone(),
                )
                .await?;
            (StatusCode::CREATED, offer)
        }
        "accept" => {
            let offer = state.negotiation.accept_offer(offer_id()?, actor).await?;
            (StatusCode::OK, offer)
        }
        "reject" => {
            let offer = state.negotiation.reject_offer(offer_id()?, actor).await?;
            (StatusCode::OK, offer)
        }
        "withdraw" => {
            let offer = state.negotiation.withdraw_offer(offer_id()?, actor).await?;
            (StatusCode::OK, offer)
        }
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown offer action: {other}"
            )));
        }
    };

    Ok((status, Json(OfferResponse::from(&offer))))
}

/// POST /marketplace/counter-offer — counter a pending offer.
#[tracing::instrument(skip(state, headers, req))]
pub async fn counter<S: MarketplaceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CounterOfferRequest>,
) -> Result<Json<OfferResponse>, ApiError> {
    let actor = actor_id(&headers)?;
    let counter = state
        .negotiation
        .counter_offer(
            OfferId::from_uuid(req.offer_id),
            actor,
            Money::from_minor(req.nouveau_prix_total),
            req.message,
        )
        .await?;
    Ok(Json(OfferResponse::from(&counter)))
}
