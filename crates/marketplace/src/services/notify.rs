//! Notification adapter trait and in-memory implementation.
//!
//! Notifications are fire-and-forget signals emitted after a transaction
//! commits. Failures are logged and swallowed; they never fail the
//! caller's request and never run inside the transaction.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::UserId;
use thiserror::Error;

/// Failure reported by the notification transport.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotificationError(pub String);

/// State transitions the core signals to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketEvent {
    ListingCreated,
    ListingRemoved,
    ListingSold,
    PurchaseConfirmed,
    OfferReceived,
    OfferCountered,
    OfferAccepted,
    OfferRejected,
    OfferWithdrawn,
    OfferExpired,
}

impl MarketEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketEvent::ListingCreated => "listing_created",
            MarketEvent::ListingRemoved => "listing_removed",
            MarketEvent::ListingSold => "listing_sold",
            MarketEvent::PurchaseConfirmed => "purchase_confirmed",
            MarketEvent::OfferReceived => "offer_received",
            MarketEvent::OfferCountered => "offer_countered",
            MarketEvent::OfferAccepted => "offer_accepted",
            MarketEvent::OfferRejected => "offer_rejected",
            MarketEvent::OfferWithdrawn => "offer_withdrawn",
            MarketEvent::OfferExpired => "offer_expired",
        }
    }
}

/// Trait for the notification collaborator.
#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    /// Delivers one event to one recipient.
    async fn notify(
        &self,
        recipient: UserId,
        event: MarketEvent,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError>;
}

/// Sends a notification, logging and swallowing any failure.
pub(crate) async fn best_effort<N: NotificationAdapter>(
    notifier: &N,
    recipient: UserId,
    event: MarketEvent,
    payload: serde_json::Value,
) {
    if let Err(e) = notifier.notify(recipient, event, payload).await {
        tracing::warn!(%recipient, event = event.as_str(), error = %e, "notification failed");
    }
}

/// A notification captured by the in-memory adapter.
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub recipient: UserId,
    pub event: MarketEvent,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<SentNotification>,
    fail_on_notify: bool,
}

/// In-memory notifier for tests and single-node development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail on delivery.
    pub fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().unwrap().fail_on_notify = fail;
    }

    /// Returns every captured notification.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns how many notifications of an event type were delivered.
    pub fn count_of(&self, event: MarketEvent) -> usize {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|n| n.event == event)
            .count()
    }
}

#[async_trait]
impl NotificationAdapter for InMemoryNotifier {
    async fn notify(
        &self,
        recipient: UserId,
        event: MarketEvent,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_notify {
            return Err(NotificationError("transport unavailable".to_string()));
        }
        state.sent.push(SentNotification {
            recipient,
            event,
            payload,
        });
        Ok(())
    }
}
