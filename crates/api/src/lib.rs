//! HTTP API server for the marketplace core.
//!
//! Exposes the listing, negotiation, and sale-finalization endpoints
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use marketplace::{
    InMemoryLedger, InMemoryNotifier, ListingService, NegotiationService, SaleFinalizer,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::MarketplaceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: MarketplaceStore> {
    pub listings: ListingService<S, InMemoryNotifier>,
    pub negotiation: NegotiationService<S, InMemoryNotifier>,
    pub finalizer: SaleFinalizer<S, InMemoryLedger, InMemoryNotifier>,
    pub store: S,
    pub ledger: InMemoryLedger,
    pub notifier: InMemoryNotifier,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: MarketplaceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/marketplace/listings", post(routes::listings::create::<S>))
        .route(
            "/marketplace/listings/details",
            post(routes::listings::details::<S>),
        )
        .route(
            "/marketplace/listings/{id}",
            get(routes::listings::get::<S>),
        )
        .route(
            "/marketplace/listings/{id}",
            delete(routes::listings::remove::<S>),
        )
        .route("/marketplace/offers", post(routes::offers::act::<S>))
        .route(
            "/marketplace/counter-offer",
            post(routes::offers::counter::<S>),
        )
        .route(
            "/marketplace/sales/complete",
            post(routes::sales::complete::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state over the given store, wiring
/// the in-memory ledger and notifier collaborators.
pub fn create_default_state<S: MarketplaceStore + Clone + 'static>(store: S) -> Arc<AppState<S>> {
    let ledger = InMemoryLedger::new();
    let notifier = InMemoryNotifier::new();

    Arc::new(AppState {
        listings: ListingService::new(store.clone(), notifier.clone()),
        negotiation: NegotiationService::new(store.clone(), notifier.clone()),
        finalizer: SaleFinalizer::new(store.clone(), ledger.clone(), notifier.clone()),
        store,
        ledger,
        notifier,
    })
}
