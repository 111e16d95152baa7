//! The immutable record produced by sale finalization.

use chrono::{DateTime, NaiveDate, Utc};
use common::{FarmId, ListingId, OfferId, SubjectId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use crate::value_objects::Money;

/// A completed sale.
///
/// Created exactly once by the sale finalizer and never mutated
/// afterwards; replays of `complete_sale` return this record verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleTransaction {
    pub id: TransactionId,
    pub listing_id: ListingId,
    /// The accepted offer this sale settles.
    pub offer_id: OfferId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub farm_id: FarmId,
    /// Every subject covered by the sold listing, in sorted order.
    pub subject_ids: Vec<SubjectId>,
    pub final_price: Money,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    /// Agreed pickup date, if any.
    pub pickup_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}
