//! Ledger adapter trait and in-memory implementation.
//!
//! The ledger is the external financial system. The finalizer requests
//! exactly one revenue entry per sale transaction; the request is
//! idempotent by transaction id, so a replay after a timeout cannot
//! duplicate revenue.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{FarmId, TransactionId};
use domain::Money;
use thiserror::Error;

/// Failure reported by the ledger system.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct LedgerError(pub String);

/// A recorded revenue entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub farm_id: FarmId,
    pub amount: Money,
    pub description: String,
}

/// Trait for the revenue-recording collaborator.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Records revenue for a completed sale, keyed by transaction id.
    ///
    /// Re-submitting with the same transaction id must return the
    /// existing entry id instead of creating a second entry.
    async fn record_revenue(
        &self,
        transaction_id: TransactionId,
        farm_id: FarmId,
        amount: Money,
        description: &str,
    ) -> Result<String, LedgerError>;
}

#[derive(Debug, Default)]
struct InMemoryLedgerState {
    entries: HashMap<TransactionId, LedgerEntry>,
    next_id: u32,
    fail_on_record: bool,
}

/// In-memory ledger for tests and single-node development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<InMemoryLedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the ledger to fail on the next record call.
    pub fn set_fail_on_record(&self, fail: bool) {
        self.state.write().unwrap().fail_on_record = fail;
    }

    /// Returns the number of recorded entries.
    pub fn entry_count(&self) -> usize {
        self.state.read().unwrap().entries.len()
    }

    /// Returns the entry recorded for a transaction, if any.
    pub fn entry_for(&self, transaction_id: TransactionId) -> Option<LedgerEntry> {
        self.state
            .read()
            .unwrap()
            .entries
            .get(&transaction_id)
            .cloned()
    }
}

#[async_trait]
impl LedgerAdapter for InMemoryLedger {
    async fn record_revenue(
        &self,
        transaction_id: TransactionId,
        farm_id: FarmId,
        amount: Money,
        description: &str,
    ) -> Result<String, LedgerError> {
        let mut state = self.state.write().unwrap();

        if let Some(existing) = state.entries.get(&transaction_id) {
            return Ok(existing.entry_id.clone());
        }

        if state.fail_on_record {
            return Err(LedgerError("ledger unreachable".to_string()));
        }

        state.next_id += 1;
        let entry_id = format!("REV-{:04}", state.next_id);
        state.entries.insert(
            transaction_id,
            LedgerEntry {
                entry_id: entry_id.clone(),
                farm_id,
                amount,
                description: description.to_string(),
            },
        );

        Ok(entry_id)
    }
}
