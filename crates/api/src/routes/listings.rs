//! Listing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{BatchId, ListingId, SubjectId};
use domain::{Listing, ListingTarget, Money};
use marketplace::NewListing;
use serde::{Deserialize, Serialize};
use store::MarketplaceStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::actor_id;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListingRequest {
    pub listing_type: String,
    pub subject_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub farm_id: Uuid,
    pub weight_kg: f64,
    pub price_per_kg: i64,
    pub photos: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDetailsRequest {
    pub listing_ids: Vec<Uuid>,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResponse {
    pub id: String,
    pub listing_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub seller_id: String,
    pub farm_id: String,
    pub weight_kg: f64,
    pub price_per_kg: i64,
    pub calculated_price: i64,
    pub status: String,
    pub listed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sold_at: Option<String>,
    pub photos: Vec<String>,
}

impl From<&Listing> for ListingResponse {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id.to_string(),
            listing_type: listing.target.kind_str().to_string(),
            subject_id: listing.target.subject_id().map(|s| s.to_string()),
            batch_id: listing.target.batch_id().map(|b| b.to_string()),
            seller_id: listing.seller_id.to_string(),
            farm_id: listing.farm_id.to_string(),
            weight_kg: listing.weight_kg.as_kg(),
            price_per_kg: listing.price_per_kg.minor(),
            calculated_price: listing.calculated_price().minor(),
            status: listing.status.to_string(),
            listed_at: listing.listed_at.to_rfc3339(),
            sold_at: listing.sold_at.map(|t| t.to_rfc3339()),
            photos: listing.photos.clone(),
        }
    }
}

// -- Handlers --

/// POST /marketplace/listings — create an individual or batch listing.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: MarketplaceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<ListingResponse>), ApiError> {
    let seller_id = actor_id(&headers)?;

    let target = match req.listing_type.as_str() {
        "individual" => ListingTarget::Individual {
            subject_id: SubjectId::from_uuid(req.subject_id.ok_or_else(|| {
                ApiError::BadRequest("individual listing requires subjectId".to_string())
            })?),
        },
        "batch" => ListingTarget::Batch {
            batch_id: BatchId::from_uuid(req.batch_id.ok_or_else(|| {
                ApiError::BadRequest("batch listing requires batchId".to_string())
            })?),
        },
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown listing type: {other}"
            )));
        }
    };

    let listing = state
        .listings
        .create_listing(NewListing {
            seller_id,
            farm_id: common::FarmId::from_uuid(req.farm_id),
            target,
            weight_kg: req.weight_kg,
            price_per_kg: Money::from_minor(req.price_per_kg),
            photos: req.photos.unwrap_or_default(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ListingResponse::from(&listing))))
}

/// DELETE /marketplace/listings/{id} — remove a listing (seller only,
/// idempotent).
#[tracing::instrument(skip(state, headers))]
pub async fn remove<S: MarketplaceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ListingResponse>, ApiError> {
    let actor = actor_id(&headers)?;
    let id = parse_listing_id(&id)?;
    let listing = state.listings.remove_listing(id, actor).await?;
    Ok(Json(ListingResponse::from(&listing)))
}

/// GET /marketplace/listings/{id} — load one listing.
#[tracing::instrument(skip(state))]
pub async fn get<S: MarketplaceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ListingResponse>, ApiError> {
    let id = parse_listing_id(&id)?;
    let listing = state.listings.get_listing(id).await?;
    Ok(Json(ListingResponse::from(&listing)))
}

/// POST /marketplace/listings/details — batch fetch (1..=50 ids).
#[tracing::instrument(skip(state, req))]
pub async fn details<S: MarketplaceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ListingDetailsRequest>,
) -> Result<Json<Vec<ListingResponse>>, ApiError> {
    let ids: Vec<ListingId> = req
        .listing_ids
        .into_iter()
        .map(ListingId::from_uuid)
        .collect();
    let listings = state.listings.get_listings_by_ids(&ids).await?;
    Ok(Json(listings.iter().map(ListingResponse::from).collect()))
}

pub(crate) fn parse_listing_id(raw: &str) -> Result<ListingId, ApiError> {
    let uuid = Uuid::parse_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid listing id: {e}")))?;
    Ok(ListingId::from_uuid(uuid))
}
