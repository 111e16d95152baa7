//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use marketplace::MarketplaceError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client (malformed ids, missing fields).
    BadRequest(String),
    /// Engine error carrying the marketplace taxonomy.
    Market(MarketplaceError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Market(err) => market_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn market_error_to_response(err: MarketplaceError) -> (StatusCode, String) {
    let status = match &err {
        MarketplaceError::Validation(_) => StatusCode::BAD_REQUEST,
        MarketplaceError::DuplicateActiveListing { .. } => StatusCode::CONFLICT,
        MarketplaceError::SelfPurchaseForbidden => StatusCode::FORBIDDEN,
        MarketplaceError::ListingNotAvailable { .. } => StatusCode::CONFLICT,
        MarketplaceError::Listing(_) | MarketplaceError::Offer(_) => StatusCode::CONFLICT,
        MarketplaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        MarketplaceError::Forbidden(_) => StatusCode::FORBIDDEN,
        MarketplaceError::ConcurrencyConflict => StatusCode::CONFLICT,
        MarketplaceError::LedgerWriteFailed(_) => {
            tracing::error!(error = %err, "ledger write failed");
            StatusCode::BAD_GATEWAY
        }
        MarketplaceError::Store(_) => {
            tracing::error!(error = %err, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<MarketplaceError> for ApiError {
    fn from(err: MarketplaceError) -> Self {
        ApiError::Market(err)
    }
}
