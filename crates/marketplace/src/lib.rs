//! Listing lifecycle, negotiation, and sale-finalization engine.
//!
//! Three services own the moving parts:
//! - [`ListingService`] — listing creation, removal, and batch fetch;
//! - [`NegotiationService`] — inquiries, offers, counter-offers,
//!   accept/reject/withdraw, and the expiry sweep;
//! - [`SaleFinalizer`] — the atomic transition from an accepted offer to
//!   a ledgered sale.
//!
//! Each operation opens exactly one store session: either everything it
//! does becomes visible on commit, or nothing does. Batch aggregates are
//! resynchronized inside the same session as any member write, so the
//! derived view can never be stale relative to committed state.

pub mod error;
pub mod finalizer;
pub mod listings;
pub mod negotiation;
pub mod services;
pub mod sweeper;
pub mod sync;

pub use error::MarketplaceError;
pub use finalizer::{CleanupReport, LedgerRef, SaleFinalizer, SaleOutcome, SaleRequest};
pub use listings::{ListingService, NewListing, MAX_DETAILS_BATCH};
pub use negotiation::{NegotiationService, SweepReport};
pub use services::ledger::{InMemoryLedger, LedgerAdapter, LedgerEntry, LedgerError};
pub use services::notify::{
    InMemoryNotifier, MarketEvent, NotificationAdapter, NotificationError, SentNotification,
};
pub use sweeper::spawn_expiry_sweeper;
