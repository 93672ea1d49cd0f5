//! End-to-end tests of the cart store over HTTP.
//!
//! The store talks to the fake backend through `HttpCartGateway`, so these
//! cover the full path from a store call to the wire and back.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use atelier_cart::gateway::CatalogEntry;
use atelier_cart::{CartStore, HttpCartGateway, SyncOutcome};
use atelier_core::{Identity, SourceKind, SubjectId, TargetId, UnitPrice};
use atelier_integration_tests::{FakeBackend, Scripted};
use rust_decimal::Decimal;

const ALICE: Identity = Identity::user(SubjectId::new(1));
const GUEST: Identity = Identity::guest(SubjectId::new(99));

async fn setup() -> (FakeBackend, CartStore) {
    let backend = FakeBackend::start().await.unwrap();
    backend.cart().stock(
        "12",
        SourceKind::Product,
        CatalogEntry::new("Mug", UnitPrice::new(Decimal::from(10)).unwrap()),
    );
    backend.cart().stock(
        "3",
        SourceKind::GalleryArtwork,
        CatalogEntry::new("Dusk", UnitPrice::new(Decimal::from(5)).unwrap()),
    );
    let gateway = HttpCartGateway::new(&backend.config()).unwrap();
    (backend, CartStore::new(Arc::new(gateway)))
}

// =============================================================================
// Mutation Flow Tests
// =============================================================================

#[tokio::test]
async fn test_every_mutation_is_followed_by_a_fetch() {
    let (backend, store) = setup().await;
    store.identify(ALICE).await.unwrap();

    store
        .add_item(TargetId::new("12"), SourceKind::Product, 2)
        .await
        .unwrap();
    let line = store.snapshot().lines()[0].line_id.clone();
    store.change_quantity(&line, 1).await.unwrap();
    store.remove_line(&line).await.unwrap();

    let calls: Vec<(String, String)> = backend
        .requests()
        .into_iter()
        .map(|request| (request.method, request.path))
        .collect();
    let expected_quantity_path = format!("/api/cart/{line}/quantity");
    let expected_line_path = format!("/api/cart/{line}");
    let expected: Vec<(&str, &str)> = vec![
        ("GET", "/api/cart"),
        ("POST", "/api/cart/add"),
        ("GET", "/api/cart"),
        ("PATCH", &expected_quantity_path),
        ("GET", "/api/cart"),
        ("DELETE", &expected_line_path),
        ("GET", "/api/cart"),
    ];
    assert_eq!(
        calls,
        expected
            .into_iter()
            .map(|(method, path)| (method.to_string(), path.to_string()))
            .collect::<Vec<_>>()
    );
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn test_totals_match_backend_checkout() {
    let (_backend, store) = setup().await;
    store.identify(ALICE).await.unwrap();
    store
        .add_item(TargetId::new("12"), SourceKind::Product, 2)
        .await
        .unwrap();
    store
        .add_item(TargetId::new("3"), SourceKind::GalleryArtwork, 3)
        .await
        .unwrap();

    let shown = store.snapshot().total_price();
    let receipt = store.checkout().await.unwrap().unwrap();

    assert_eq!(shown, Decimal::from(35));
    assert_eq!(receipt.total_amount, shown);
    assert!(store.snapshot().is_empty());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_server_rejection_keeps_snapshot() {
    let (backend, store) = setup().await;
    store.identify(ALICE).await.unwrap();
    store
        .add_item(TargetId::new("12"), SourceKind::Product, 1)
        .await
        .unwrap();
    let before = store.snapshot();

    backend.script(Scripted::status(409, r#"{"message":"Out of stock"}"#));
    let err = store
        .add_item(TargetId::new("12"), SourceKind::Product, 1)
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "Out of stock");
    assert!(store.snapshot().ptr_eq(&before));
}

#[tokio::test]
async fn test_failed_refresh_keeps_last_known_cart() {
    let (backend, store) = setup().await;
    store.identify(ALICE).await.unwrap();
    store
        .add_item(TargetId::new("12"), SourceKind::Product, 1)
        .await
        .unwrap();
    let before = store.snapshot();

    backend.script(Scripted::status(500, ""));
    assert!(store.refresh().await.is_err());

    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_clear_failure_still_empties_locally() {
    let (backend, store) = setup().await;
    store.identify(ALICE).await.unwrap();
    store
        .add_item(TargetId::new("12"), SourceKind::Product, 1)
        .await
        .unwrap();

    backend.script(Scripted::status(503, r#"{"message":"Maintenance"}"#));
    let err = store.clear_cart().await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert!(store.snapshot().is_empty());
}

// =============================================================================
// Identity Tests
// =============================================================================

#[tokio::test]
async fn test_no_identity_sends_nothing() {
    let (backend, store) = setup().await;

    store
        .add_item(TargetId::new("12"), SourceKind::Product, 1)
        .await
        .unwrap();
    store.clear_cart().await.unwrap();
    assert_eq!(store.refresh().await.unwrap(), SyncOutcome::NoIdentity);

    assert!(backend.requests().is_empty());
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn test_guest_logout_clears_server_cart() {
    let (backend, store) = setup().await;
    store.identify(GUEST).await.unwrap();
    store
        .add_item(TargetId::new("12"), SourceKind::Product, 1)
        .await
        .unwrap();

    let notified = Arc::new(AtomicUsize::new(0));
    let _sub = {
        let notified = Arc::clone(&notified);
        store.subscribe(move || {
            notified.fetch_add(1, Ordering::SeqCst);
        })
    };

    store.end_session().await;

    assert!(store.snapshot().is_empty());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    let request = backend.last_request().unwrap();
    assert_eq!(request.method, "DELETE");
    assert_eq!(request.query.as_deref(), Some("subject=99"));
    assert!(backend.cart().server_cart(GUEST.subject).unwrap().is_empty());
}
