//! Periodic offer-expiry sweep.
//!
//! The only background activity in the engine. It runs independently of
//! request handling and is advisory housekeeping: every tick it lapses
//! stale offers and releases reservations whose accepted offer never
//! finalized.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use store::MarketplaceStore;

use crate::negotiation::NegotiationService;
use crate::services::notify::NotificationAdapter;

/// Spawns the expiry sweep loop on the current runtime.
///
/// The task runs until the handle is aborted (or the runtime shuts
/// down). Sweep failures are logged and the loop keeps going.
pub fn spawn_expiry_sweeper<S, N>(
    negotiation: Arc<NegotiationService<S, N>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    S: MarketplaceStore + 'static,
    N: NotificationAdapter + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match negotiation.expire_stale_offers(Utc::now()).await {
                Ok(report) if report.offers_expired > 0 => {
                    tracing::debug!(
                        expired = report.offers_expired,
                        released = report.listings_released,
                        "sweep tick"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "offer expiry sweep failed");
                }
            }
        }
    })
}
