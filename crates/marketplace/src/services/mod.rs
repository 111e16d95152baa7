//! External collaborator traits and in-memory implementations.

pub mod ledger;
pub mod notify;

pub use ledger::{InMemoryLedger, LedgerAdapter, LedgerEntry, LedgerError};
pub use notify::{
    InMemoryNotifier, MarketEvent, NotificationAdapter, NotificationError, SentNotification,
};
