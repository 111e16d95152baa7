//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::SubjectId;
use metrics_exporter_prometheus::PrometheusHandle;
use store::InMemoryStore;
use tower::ServiceExt;
use uuid::Uuid;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (Router, Arc<api::AppState<InMemoryStore>>) {
    let store = InMemoryStore::new();
    let state = api::create_default_state(store);
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn post_json(uri: &str, actor: Option<Uuid>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(actor) = actor {
        builder = builder.header("x-user-id", actor.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_listing(
    app: &Router,
    state: &api::AppState<InMemoryStore>,
    seller: Uuid,
) -> (String, Uuid) {
    let subject = SubjectId::new();
    state.store.seed_subject(subject, None).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/marketplace/listings",
            Some(seller),
            serde_json::json!({
                "listingType": "individual",
                "subjectId": subject.as_uuid(),
                "farmId": Uuid::new_v4(),
                "weightKg": 80.0,
                "pricePerKg": 1000,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    (
        json["id"].as_str().unwrap().to_string(),
        subject.as_uuid(),
    )
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_listing_computes_price() {
    let (app, state) = setup();
    let seller = Uuid::new_v4();
    let subject = SubjectId::new();
    state.store.seed_subject(subject, None).await;

    let response = app
        .oneshot(post_json(
            "/marketplace/listings",
            Some(seller),
            serde_json::json!({
                "listingType": "individual",
                "subjectId": subject.as_uuid(),
                "farmId": Uuid::new_v4(),
                "weightKg": 80.0,
                "pricePerKg": 1000,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["calculatedPrice"], 80_000);
    assert_eq!(json["status"], "available");
    assert_eq!(json["listingType"], "individual");
}

#[tokio::test]
async fn test_create_listing_requires_identity() {
    let (app, _) = setup();
    let response = app
        .oneshot(post_json(
            "/marketplace/listings",
            None,
            serde_json::json!({
                "listingType": "individual",
                "subjectId": Uuid::new_v4(),
                "farmId": Uuid::new_v4(),
                "weightKg": 80.0,
                "pricePerKg": 1000,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_listing_conflicts() {
    let (app, state) = setup();
    let seller = Uuid::new_v4();
    let (_, subject) = create_listing(&app, &state, seller).await;

    let response = app
        .oneshot(post_json(
            "/marketplace/listings",
            Some(seller),
            serde_json::json!({
                "listingType": "individual",
                "subjectId": subject,
                "farmId": Uuid::new_v4(),
                "weightKg": 80.0,
                "pricePerKg": 1000,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_weight_is_bad_request() {
    let (app, state) = setup();
    let subject = SubjectId::new();
    state.store.seed_subject(subject, None).await;

    let response = app
        .oneshot(post_json(
            "/marketplace/listings",
            Some(Uuid::new_v4()),
            serde_json::json!({
                "listingType": "individual",
                "subjectId": subject.as_uuid(),
                "farmId": Uuid::new_v4(),
                "weightKg": 0.0,
                "pricePerKg": 1000,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_details_batch_cap() {
    let (app, _) = setup();

    // 51 ids is over the cap.
    let too_many: Vec<Uuid> = (0..51).map(|_| Uuid::new_v4()).collect();
    let response = app
        .clone()
        .oneshot(post_json(
            "/marketplace/listings/details",
            None,
            serde_json::json!({ "listingIds": too_many }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // An empty list is rejected too.
    let response = app
        .oneshot(post_json(
            "/marketplace/listings/details",
            None,
            serde_json::json!({ "listingIds": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_details_omits_unknown_ids() {
    let (app, state) = setup();
    let (listing_id, _) = create_listing(&app, &state, Uuid::new_v4()).await;

    let response = app
        .oneshot(post_json(
            "/marketplace/listings/details",
            None,
            serde_json::json!({ "listingIds": [listing_id, Uuid::new_v4()] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let listings = json.as_array().unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0]["id"], listing_id.as_str());
}

#[tokio::test]
async fn test_self_purchase_is_forbidden() {
    let (app, state) = setup();
    let seller = Uuid::new_v4();
    let (listing_id, _) = create_listing(&app, &state, seller).await;

    let response = app
        .oneshot(post_json(
            "/marketplace/offers",
            Some(seller),
            serde_json::json!({
                "type": "offer",
                "listingId": listing_id,
                "amount": 70_000,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_remove_listing_is_seller_only_and_idempotent() {
    let (app, state) = setup();
    let seller = Uuid::new_v4();
    let (listing_id, _) = create_listing(&app, &state, seller).await;

    let delete = |actor: Uuid| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/marketplace/listings/{listing_id}"))
            .header("x-user-id", actor.to_string())
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete(Uuid::new_v4())).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.clone().oneshot(delete(seller)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "removed");

    // Removing again still returns 200.
    let response = app.oneshot(delete(seller)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_negotiated_sale_over_http() {
    let (app, state) = setup();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let (listing_id, _) = create_listing(&app, &state, seller).await;

    // Buyer opens at 70 000.
    let response = app
        .clone()
        .oneshot(post_json(
            "/marketplace/offers",
            Some(buyer),
            serde_json::json!({
                "type": "offer",
                "listingId": listing_id,
                "amount": 70_000,
                "message": "deal this week?",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let offer = body_json(response).await;
    assert_eq!(offer["status"], "pending");

    // Seller counters at 75 000 through the dedicated endpoint.
    let response = app
        .clone()
        .oneshot(post_json(
            "/marketplace/counter-offer",
            Some(seller),
            serde_json::json!({
                "offerId": offer["id"],
                "nouveau_prix_total": 75_000,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let counter = body_json(response).await;
    assert_eq!(counter["type"], "counter_offer");
    assert_eq!(counter["counterOf"], offer["id"]);

    // Buyer accepts the counter.
    let response = app
        .clone()
        .oneshot(post_json(
            "/marketplace/offers",
            Some(buyer),
            serde_json::json!({ "type": "accept", "offerId": counter["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Seller completes the sale.
    let complete_body = serde_json::json!({
        "listingId": listing_id,
        "buyerId": buyer,
        "finalPrice": 75_000,
        "dateRecuperation": "2026-08-20",
    });
    let response = app
        .clone()
        .oneshot(post_json(
            "/marketplace/sales/complete",
            Some(seller),
            complete_body.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let sale = body_json(response).await;
    assert_eq!(sale["success"], true);
    assert_eq!(sale["transaction"]["amount"], 75_000);
    assert_eq!(sale["cleanup"]["subjectsUpdated"], 1);
    let transaction_id = sale["transaction"]["id"].as_str().unwrap().to_string();
    let revenue_id = sale["finance"]["revenueId"].as_str().unwrap().to_string();

    // Replaying the completion is safe and returns the same records.
    let response = app
        .clone()
        .oneshot(post_json(
            "/marketplace/sales/complete",
            Some(seller),
            complete_body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let replay = body_json(response).await;
    assert_eq!(replay["transaction"]["id"], transaction_id.as_str());
    assert_eq!(replay["finance"]["revenueId"], revenue_id.as_str());
    assert_eq!(state.ledger.entry_count(), 1);

    // A different buyer replaying gets a conflict.
    let response = app
        .oneshot(post_json(
            "/marketplace/sales/complete",
            Some(seller),
            serde_json::json!({
                "listingId": listing_id,
                "buyerId": Uuid::new_v4(),
                "finalPrice": 75_000,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_complete_sale_requires_reservation() {
    let (app, state) = setup();
    let seller = Uuid::new_v4();
    let (listing_id, _) = create_listing(&app, &state, seller).await;

    let response = app
        .oneshot(post_json(
            "/marketplace/sales/complete",
            Some(seller),
            serde_json::json!({
                "listingId": listing_id,
                "buyerId": Uuid::new_v4(),
                "finalPrice": 10_000,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
