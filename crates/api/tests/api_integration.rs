//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{
    CheckoutConfig, CheckoutEngine, InMemoryNotifier, InMemoryPaymentGateway,
};
use common::UserId;
use metrics_exporter_prometheus::PrometheusHandle;
use mockable::DefaultClock;
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    gateway: InMemoryPaymentGateway,
}

async fn setup() -> TestApp {
    let store = InMemoryStore::new();
    api::seed::seed_demo_catalog(&store).await.unwrap();
    let gateway = InMemoryPaymentGateway::new();

    let engine = CheckoutEngine::new(
        store,
        Arc::new(gateway.clone()),
        Arc::new(InMemoryNotifier::new()),
        Arc::new(DefaultClock),
        CheckoutConfig {
            expiry_timers: false,
            ..CheckoutConfig::default()
        },
    );
    let state = Arc::new(AppState::new(engine, get_metrics_handle(), "memory"));

    TestApp {
        app: api::create_app(state),
        gateway,
    }
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    user: Option<UserId>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn fill_cart(app: &axum::Router, user: UserId, sku: &str, quantity: u32) {
    let (status, _) = send(
        app,
        "PUT",
        "/cart",
        Some(user),
        Some(serde_json::json!({ "items": [{ "product_id": sku, "quantity": quantity }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;

    let (status, json) = send(&t.app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_checkout_and_pay() {
    let t = setup().await;
    let user = UserId::new();
    fill_cart(&t.app, user, "SKU-MOUSE", 2).await;

    let (status, order) = send(&t.app, "POST", "/orders/checkout", Some(user), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "PENDING_PAYMENT");
    assert_eq!(order["total_cents"], 5998);
    let id = order["id"].as_str().unwrap().to_string();

    let (status, paid) = send(&t.app, "POST", &format!("/orders/{id}/pay"), Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["order"]["status"], "PAID");
    assert_eq!(paid["payment"]["status"], "SUCCESS");
    assert_eq!(paid["payment"]["amount_cents"], 5998);

    let (status, details) = send(&t.app, "GET", &format!("/orders/{id}"), Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["order"]["status"], "PAID");
    assert!(details["payment"]["transaction_id"].is_string());
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let t = setup().await;

    let (status, json) = send(&t.app, "POST", "/orders/checkout", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "authorization");
}

#[tokio::test]
async fn test_empty_cart_checkout_is_bad_request() {
    let t = setup().await;

    let (status, _) = send(
        &t.app,
        "POST",
        "/orders/checkout",
        Some(UserId::new()),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_overreservation_is_conflict() {
    let t = setup().await;
    let user = UserId::new();
    fill_cart(&t.app, user, "SKU-MONITOR", 6).await;

    let (status, json) = send(&t.app, "POST", "/orders/checkout", Some(user), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "contention");
}

#[tokio::test]
async fn test_unknown_product_in_cart_is_not_found() {
    let t = setup().await;

    let (status, _) = send(
        &t.app,
        "PUT",
        "/cart",
        Some(UserId::new()),
        Some(serde_json::json!({ "items": [{ "product_id": "SKU-404", "quantity": 1 }] })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_declined_payment_is_payment_required() {
    let t = setup().await;
    let user = UserId::new();
    fill_cart(&t.app, user, "SKU-CABLE", 1).await;
    let (_, order) = send(&t.app, "POST", "/orders/checkout", Some(user), None).await;
    let id = order["id"].as_str().unwrap().to_string();
    t.gateway.set_decline_on_charge(true);

    let (status, _) = send(&t.app, "POST", &format!("/orders/{id}/pay"), Some(user), None).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let (_, details) = send(&t.app, "GET", &format!("/orders/{id}"), Some(user), None).await;
    assert_eq!(details["order"]["status"], "CANCELLED");
    assert_eq!(details["payment"]["status"], "FAILED");
}

#[tokio::test]
async fn test_other_users_order_is_forbidden() {
    let t = setup().await;
    let owner = UserId::new();
    fill_cart(&t.app, owner, "SKU-CABLE", 1).await;
    let (_, order) = send(&t.app, "POST", "/orders/checkout", Some(owner), None).await;
    let id = order["id"].as_str().unwrap().to_string();

    let intruder = Some(UserId::new());
    let (status, _) = send(&t.app, "GET", &format!("/orders/{id}"), intruder, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&t.app, "POST", &format!("/orders/{id}/pay"), intruder, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_status_update() {
    let t = setup().await;
    let user = UserId::new();
    fill_cart(&t.app, user, "SKU-KEYBOARD", 1).await;
    let (_, order) = send(&t.app, "POST", "/orders/checkout", Some(user), None).await;
    let id = order["id"].as_str().unwrap().to_string();
    let uri = format!("/admin/orders/{id}/status");

    let shipped = Some(serde_json::json!({ "status": "SHIPPED" }));
    let (status, _) = send(&t.app, "PATCH", &uri, None, shipped.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(&t.app, "POST", &format!("/orders/{id}/pay"), Some(user), None).await;
    let (status, json) = send(&t.app, "PATCH", &uri, None, shipped).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "SHIPPED");

    let bogus = Some(serde_json::json!({ "status": "LOST" }));
    let (status, _) = send(&t.app, "PATCH", &uri, None, bogus).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_order_id() {
    let t = setup().await;

    let (status, _) = send(
        &t.app,
        "GET",
        "/orders/not-a-uuid",
        Some(UserId::new()),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
