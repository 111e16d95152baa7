//! Shared identifier types for the marketplace core.
//!
//! Every entity the core touches is keyed by a UUID newtype so that a
//! listing id can never be passed where a subject id is expected.

pub mod ids;

pub use ids::{BatchId, FarmId, ListingId, OfferId, SubjectId, TransactionId, UserId};
