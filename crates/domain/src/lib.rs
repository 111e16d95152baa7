//! Domain layer for the livestock marketplace core.
//!
//! This crate is the pure heart of the system: entity types with
//! tagged-union state machines, value objects, and the batch-aggregation
//! function. It performs no I/O: persistence lives in the `store` crate
//! and orchestration in the `marketplace` crate.

pub mod listing;
pub mod offer;
pub mod registry;
pub mod sale;
pub mod value_objects;

pub use listing::{Listing, ListingError, ListingState, ListingTarget, RemovalReason};
pub use offer::{Offer, OfferError, OfferKind, OfferStatus};
pub use registry::{BatchAggregate, BatchMarketStatus, SubjectMarketStatus, SubjectProjection};
pub use sale::SaleTransaction;
pub use value_objects::{Money, WeightKg};
