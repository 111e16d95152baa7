//! Route handlers.

pub mod health;
pub mod listings;
pub mod metrics;
pub mod offers;
pub mod sales;

use axum::http::HeaderMap;
use common::UserId;
use uuid::Uuid;

use crate::error::ApiError;

/// Extracts the acting user from the `x-user-id` header.
///
/// Authentication itself is an external collaborator; the core only
/// needs a verified identity to enforce seller/buyer/party checks.
pub(crate) fn actor_id(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let raw = headers
        .get("x-user-id")
        .ok_or_else(|| ApiError::BadRequest("missing x-user-id header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::BadRequest("invalid x-user-id header".to_string()))?;
    let uuid = Uuid::parse_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid x-user-id header: {e}")))?;
    Ok(UserId::from_uuid(uuid))
}
