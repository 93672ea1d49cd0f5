//! Integration tests for the REST cart gateway.
//!
//! These tests run `HttpCartGateway` against the fake backend and check the
//! requests it sends and how it maps responses and failures.

#![allow(clippy::unwrap_used)]

use std::num::NonZeroU32;
use std::time::Duration;

use atelier_cart::gateway::{AddLine, CatalogEntry};
use atelier_cart::{CartError, CartGateway, GatewayConfig, HttpCartGateway, ResponseBody};
use atelier_core::{LineId, SourceKind, SubjectId, TargetId, UnitPrice};
use atelier_integration_tests::{FakeBackend, Scripted};
use rust_decimal::Decimal;
use url::Url;

const SUBJECT: SubjectId = SubjectId::new(7);

async fn setup() -> (FakeBackend, HttpCartGateway) {
    let backend = FakeBackend::start().await.unwrap();
    backend.cart().stock(
        "12",
        SourceKind::Product,
        CatalogEntry::new("Mug", UnitPrice::new(Decimal::new(1250, 2)).unwrap()),
    );
    let gateway = HttpCartGateway::new(&backend.config()).unwrap();
    (backend, gateway)
}

fn add_mug(quantity: u32) -> AddLine {
    AddLine {
        target_id: TargetId::new("12"),
        source_kind: SourceKind::Product,
        quantity: NonZeroU32::new(quantity).unwrap(),
        subject: SUBJECT,
    }
}

// =============================================================================
// Request Shape Tests
// =============================================================================

#[tokio::test]
async fn test_fetch_sends_subject_query() {
    let (backend, gateway) = setup().await;

    let cart = gateway.fetch(SUBJECT).await.unwrap();

    assert!(cart.is_empty());
    let request = backend.last_request().unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/api/cart");
    assert_eq!(request.query.as_deref(), Some("subject=7"));
}

#[tokio::test]
async fn test_add_sends_target_and_subject() {
    let (backend, gateway) = setup().await;

    gateway.add(&add_mug(2)).await.unwrap();

    let request = backend.last_request().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/cart/add");
    assert_eq!(
        request.body.unwrap(),
        serde_json::json!({
            "targetId": "12",
            "sourceKind": "PRODUCT",
            "quantity": 2,
            "subject": 7
        })
    );
}

#[tokio::test]
async fn test_line_operations_use_line_paths() {
    let (backend, gateway) = setup().await;
    gateway.add(&add_mug(1)).await.unwrap();
    let line = gateway.fetch(SUBJECT).await.unwrap().lines()[0].line_id.clone();

    gateway.change_quantity(&line, -1).await.unwrap();
    let request = backend.last_request().unwrap();
    assert_eq!(request.method, "PATCH");
    assert_eq!(request.path, format!("/api/cart/{line}/quantity"));
    assert_eq!(request.query.as_deref(), Some("delta=-1"));

    gateway.add(&add_mug(1)).await.unwrap();
    let line = gateway.fetch(SUBJECT).await.unwrap().lines()[0].line_id.clone();
    gateway.remove(&line).await.unwrap();
    let request = backend.last_request().unwrap();
    assert_eq!(request.method, "DELETE");
    assert_eq!(request.path, format!("/api/cart/{line}"));
}

#[tokio::test]
async fn test_clear_sends_subject_query() {
    let (backend, gateway) = setup().await;
    gateway.add(&add_mug(1)).await.unwrap();

    gateway.clear(SUBJECT).await.unwrap();

    let request = backend.last_request().unwrap();
    assert_eq!(request.method, "DELETE");
    assert_eq!(request.path, "/api/cart/clear");
    assert_eq!(request.query.as_deref(), Some("subject=7"));
    assert!(backend.cart().server_cart(SUBJECT).unwrap().is_empty());
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let backend = FakeBackend::start().await.unwrap();
    let config = backend
        .config()
        .with_api_token("session-token".to_string().into());
    let gateway = HttpCartGateway::new(&config).unwrap();

    gateway.fetch(SUBJECT).await.unwrap();

    assert_eq!(
        backend.last_request().unwrap().authorization.as_deref(),
        Some("Bearer session-token")
    );
}

#[tokio::test]
async fn test_no_token_sends_no_authorization() {
    let (backend, gateway) = setup().await;

    gateway.fetch(SUBJECT).await.unwrap();

    assert!(backend.last_request().unwrap().authorization.is_none());
}

// =============================================================================
// Response Mapping Tests
// =============================================================================

#[tokio::test]
async fn test_fetch_returns_server_lines() {
    let (_backend, gateway) = setup().await;
    gateway.add(&add_mug(2)).await.unwrap();
    gateway.add(&add_mug(1)).await.unwrap();

    let cart = gateway.fetch(SUBJECT).await.unwrap();

    assert_eq!(cart.line_count(), 1);
    let line = &cart.lines()[0];
    assert_eq!(line.display_name, "Mug");
    assert_eq!(line.quantity.get(), 3);
    assert_eq!(cart.total_price(), Decimal::new(3750, 2));
}

#[tokio::test]
async fn test_fetch_accepts_legacy_field_names() {
    let (backend, gateway) = setup().await;
    backend.script(Scripted::status(
        200,
        r#"[{"cartItemId":9,"id":3,"name":"Dusk","price":40,"quantity":2,"source":"GALLERY","imageUrl":"/img/3.png"}]"#,
    ));

    let cart = gateway.fetch(SUBJECT).await.unwrap();

    let line = &cart.lines()[0];
    assert_eq!(line.line_id, LineId::new("9"));
    assert_eq!(line.source, SourceKind::GalleryArtwork);
    assert_eq!(line.image_ref.as_deref(), Some("/img/3.png"));
    assert_eq!(cart.total_price(), Decimal::from(80));
}

#[tokio::test]
async fn test_rejection_carries_status_path_and_message() {
    let (_backend, gateway) = setup().await;
    let mut request = add_mug(1);
    request.target_id = TargetId::new("404");

    let err = gateway.add(&request).await.unwrap_err();

    match &err {
        CartError::Rejected {
            status,
            method,
            path,
            message,
            body,
        } => {
            assert_eq!(*status, 404);
            assert_eq!(method, "POST");
            assert_eq!(path, "/api/cart/add");
            assert_eq!(message.as_deref(), Some("Target not found"));
            assert!(matches!(body, ResponseBody::Json(_)));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(err.user_message(), "Target not found");
}

#[tokio::test]
async fn test_rejection_keeps_raw_body() {
    let (backend, gateway) = setup().await;
    backend.script(Scripted::status(502, "Bad Gateway"));

    let err = gateway.fetch(SUBJECT).await.unwrap_err();

    match &err {
        CartError::Rejected {
            status,
            path,
            message,
            body,
            ..
        } => {
            assert_eq!(*status, 502);
            assert_eq!(path, "/api/cart?subject=7");
            assert!(message.is_none());
            assert_eq!(*body, ResponseBody::Raw("Bad Gateway".to_string()));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(err.user_message(), "Bad Gateway");
}

#[tokio::test]
async fn test_malformed_cart_is_invalid_payload() {
    let (backend, gateway) = setup().await;
    backend.script(Scripted::status(200, r#"{"not":"a list"}"#));

    let err = gateway.fetch(SUBJECT).await.unwrap_err();

    assert!(matches!(err, CartError::InvalidPayload { .. }));
}

#[tokio::test]
async fn test_zero_quantity_record_rejects_cart() {
    let (backend, gateway) = setup().await;
    backend.script(Scripted::status(
        200,
        r#"[{"lineId":"1","targetId":"12","sourceKind":"PRODUCT","unitPrice":"1.00","quantity":0}]"#,
    ));

    let err = gateway.fetch(SUBJECT).await.unwrap_err();

    assert!(matches!(err, CartError::InvalidRecord { .. }));
}

#[tokio::test]
async fn test_checkout_returns_receipt() {
    let (backend, gateway) = setup().await;
    gateway.add(&add_mug(2)).await.unwrap();

    let receipt = gateway.checkout(SUBJECT).await.unwrap();

    assert_eq!(receipt.total_amount, Decimal::from(25));
    let request = backend.last_request().unwrap();
    assert_eq!(request.path, "/api/checkout");
    assert_eq!(request.body.unwrap(), serde_json::json!({ "subject": 7 }));
}

// =============================================================================
// Transport Tests
// =============================================================================

#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = FakeBackend::start().await.unwrap();
    backend.script(Scripted::status(200, "[]").delayed(Duration::from_secs(5)));
    let config = backend.config().with_timeout(Duration::from_millis(200));
    let gateway = HttpCartGateway::new(&config).unwrap();

    let err = gateway.fetch(SUBJECT).await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.user_message(), "The request timed out");
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    // Bind and release a port so nothing is listening on it
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let base = Url::parse(&format!("http://{addr}/api")).unwrap();
    let gateway = HttpCartGateway::new(&GatewayConfig::new(base)).unwrap();

    let err = gateway.fetch(SUBJECT).await.unwrap_err();

    assert!(matches!(err, CartError::Transport(_)));
    assert_eq!(err.user_message(), "Could not reach the cart service");
}

#[tokio::test]
async fn test_base_url_path_is_kept() {
    let backend = FakeBackend::start().await.unwrap();
    let mut base = backend.base_url().clone();
    base.set_path("/api/");
    let gateway = HttpCartGateway::new(&GatewayConfig::new(base)).unwrap();

    gateway.fetch(SUBJECT).await.unwrap();

    assert_eq!(backend.last_request().unwrap().path, "/api/cart");
}
