//! Transactional state store for the marketplace core.
//!
//! Every engine operation runs inside an explicitly passed
//! [`StoreSession`]: one session, one transaction boundary. The listing
//! row is the unit of mutual exclusion: `*_for_update` methods take
//! pessimistic locks held until the session commits or is dropped.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemorySession, InMemoryStore};
pub use postgres::{PostgresSession, PostgresStore};
pub use store::{MarketplaceStore, StoreSession};
