//! In-process cart backend.
//!
//! Implements the backend cart semantics in memory: one cart per subject,
//! one line per `(target, source)` pair, line ids that are never reused and
//! deletion when a quantity drops to zero. Prices and names are joined from
//! the catalog on every fetch, like the real backend does.
//!
//! Also records every call and can inject failures or hold a call open, so
//! the store's ordering and failure guarantees can be exercised.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use atelier_core::{
    CartLine, CartSnapshot, LineId, OrderId, SourceKind, SubjectId, TargetId, UnitPrice,
};
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tracing::debug;

use super::{AddLine, CartGateway, CheckoutReceipt};
use crate::error::{CartError, ResponseBody};

/// Gateway operation, used for call accounting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Fetch,
    Add,
    ChangeQuantity,
    Remove,
    Clear,
    Checkout,
}

impl std::fmt::Display for GatewayOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Add => write!(f, "add"),
            Self::ChangeQuantity => write!(f, "change_quantity"),
            Self::Remove => write!(f, "remove"),
            Self::Clear => write!(f, "clear"),
            Self::Checkout => write!(f, "checkout"),
        }
    }
}

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayCalls {
    pub fetch: usize,
    pub add: usize,
    pub change_quantity: usize,
    pub remove: usize,
    pub clear: usize,
    pub checkout: usize,
}

impl GatewayCalls {
    /// Calls across all operations.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.fetch + self.add + self.change_quantity + self.remove + self.clear + self.checkout
    }

    const fn record(&mut self, op: GatewayOp) {
        match op {
            GatewayOp::Fetch => self.fetch += 1,
            GatewayOp::Add => self.add += 1,
            GatewayOp::ChangeQuantity => self.change_quantity += 1,
            GatewayOp::Remove => self.remove += 1,
            GatewayOp::Clear => self.clear += 1,
            GatewayOp::Checkout => self.checkout += 1,
        }
    }
}

/// Presentation data of a purchasable target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub display_name: String,
    pub unit_price: UnitPrice,
    pub image_ref: Option<String>,
}

impl CatalogEntry {
    /// Entry without an image.
    #[must_use]
    pub fn new(display_name: impl Into<String>, unit_price: UnitPrice) -> Self {
        Self {
            display_name: display_name.into(),
            unit_price,
            image_ref: None,
        }
    }
}

/// Releases a call held by [`InMemoryCartGateway::hold_next`].
///
/// Dropping it also releases the call.
#[derive(Debug)]
pub struct HeldCall(oneshot::Sender<()>);

impl HeldCall {
    /// Let the held call proceed.
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

#[derive(Debug)]
struct StoredLine {
    line_id: LineId,
    target_id: TargetId,
    source: SourceKind,
    quantity: u32,
}

#[derive(Debug, Default)]
struct Backend {
    catalog: HashMap<(TargetId, SourceKind), CatalogEntry>,
    carts: HashMap<SubjectId, Vec<StoredLine>>,
    next_line: u64,
    next_order: u64,
    max_quantity: Option<u32>,
    calls: GatewayCalls,
    failures: HashSet<GatewayOp>,
}

impl Backend {
    /// Count the call and consume an injected failure, if any.
    fn begin(&mut self, op: GatewayOp) -> Result<(), CartError> {
        self.calls.record(op);
        if self.failures.remove(&op) {
            debug!(op = %op, "Injected cart backend failure");
            return Err(CartError::Unavailable(format!("injected {op} failure")));
        }
        Ok(())
    }

    fn snapshot(&self, subject: SubjectId) -> Result<CartSnapshot, CartError> {
        let lines = self
            .carts
            .get(&subject)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|stored| {
                        let entry = self
                            .catalog
                            .get(&(stored.target_id.clone(), stored.source))?;
                        Some(CartLine {
                            line_id: stored.line_id.clone(),
                            target_id: stored.target_id.clone(),
                            source: stored.source,
                            display_name: entry.display_name.clone(),
                            unit_price: entry.unit_price,
                            image_ref: entry.image_ref.clone(),
                            quantity: NonZeroU32::new(stored.quantity)?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        CartSnapshot::from_lines(lines).map_err(|e| CartError::InvalidRecord {
            path: format!("/cart?subject={subject}"),
            reason: e.to_string(),
        })
    }

    fn find_line(&self, line_id: &LineId) -> Option<(SubjectId, usize)> {
        self.carts.iter().find_map(|(subject, lines)| {
            lines
                .iter()
                .position(|line| &line.line_id == line_id)
                .map(|index| (*subject, index))
        })
    }

    fn check_limit(&self, quantity: u64, method: &str, path: &str) -> Result<u32, CartError> {
        let limit = self.max_quantity.unwrap_or(u32::MAX);
        u32::try_from(quantity)
            .ok()
            .filter(|q| *q <= limit)
            .ok_or_else(|| rejected(409, method, path, "Quantity limit exceeded"))
    }
}

/// In-memory [`CartGateway`].
#[derive(Debug, Default)]
pub struct InMemoryCartGateway {
    backend: Mutex<Backend>,
    held: Mutex<HashMap<GatewayOp, oneshot::Receiver<()>>>,
}

impl InMemoryCartGateway {
    /// Create an empty backend with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a catalog entry.
    pub fn stock(&self, target_id: impl Into<TargetId>, source: SourceKind, entry: CatalogEntry) {
        self.backend()
            .catalog
            .insert((target_id.into(), source), entry);
    }

    /// Change the price of a stocked target. Carts pick it up on the next fetch.
    pub fn set_price(&self, target_id: &TargetId, source: SourceKind, unit_price: UnitPrice) {
        if let Some(entry) = self
            .backend()
            .catalog
            .get_mut(&(target_id.clone(), source))
        {
            entry.unit_price = unit_price;
        }
    }

    /// Cap the quantity of any single line.
    pub fn set_max_quantity(&self, limit: Option<u32>) {
        self.backend().max_quantity = limit;
    }

    /// Make the next call of `op` fail with [`CartError::Unavailable`].
    pub fn fail_next(&self, op: GatewayOp) {
        self.backend().failures.insert(op);
    }

    /// Keep the next call of `op` from running until the returned handle is
    /// released. The call is counted before it waits.
    #[must_use]
    pub fn hold_next(&self, op: GatewayOp) -> HeldCall {
        let (tx, rx) = oneshot::channel();
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, rx);
        HeldCall(tx)
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> GatewayCalls {
        self.backend().calls
    }

    /// Server-side view of a cart, without counting a call.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored cart violates the cart invariants.
    pub fn server_cart(&self, subject: SubjectId) -> Result<CartSnapshot, CartError> {
        self.backend().snapshot(subject)
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a call of `op`, fail it if a failure was injected and wait out
    /// any hold placed on it.
    async fn enter(&self, op: GatewayOp) -> Result<(), CartError> {
        self.backend().begin(op)?;

        let held = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&op);
        if let Some(gate) = held {
            // A dropped release counts as released.
            let _ = gate.await;
        }
        Ok(())
    }
}

#[async_trait]
impl CartGateway for InMemoryCartGateway {
    async fn fetch(&self, subject: SubjectId) -> Result<CartSnapshot, CartError> {
        self.enter(GatewayOp::Fetch).await?;
        self.backend().snapshot(subject)
    }

    async fn add(&self, request: &AddLine) -> Result<(), CartError> {
        const PATH: &str = "/cart/add";

        self.enter(GatewayOp::Add).await?;
        let mut backend = self.backend();

        let key = (request.target_id.clone(), request.source_kind);
        if !backend.catalog.contains_key(&key) {
            return Err(rejected(404, "POST", PATH, "Target not found"));
        }

        let existing = backend.carts.get(&request.subject).and_then(|lines| {
            lines
                .iter()
                .position(|line| line.target_id == key.0 && line.source == key.1)
                .map(|index| (index, lines.get(index).map_or(0, |line| line.quantity)))
        });

        match existing {
            Some((index, quantity)) => {
                let updated = backend.check_limit(
                    u64::from(quantity) + u64::from(request.quantity.get()),
                    "POST",
                    PATH,
                )?;
                if let Some(line) = backend
                    .carts
                    .get_mut(&request.subject)
                    .and_then(|lines| lines.get_mut(index))
                {
                    line.quantity = updated;
                }
            }
            None => {
                let quantity =
                    backend.check_limit(u64::from(request.quantity.get()), "POST", PATH)?;
                backend.next_line += 1;
                let line = StoredLine {
                    line_id: LineId::new(backend.next_line.to_string()),
                    target_id: key.0,
                    source: key.1,
                    quantity,
                };
                backend.carts.entry(request.subject).or_default().push(line);
            }
        }

        Ok(())
    }

    async fn change_quantity(&self, line_id: &LineId, delta: i32) -> Result<(), CartError> {
        let path = format!("/cart/{line_id}/quantity?delta={delta}");

        self.enter(GatewayOp::ChangeQuantity).await?;
        let mut backend = self.backend();

        let (subject, index) = backend
            .find_line(line_id)
            .ok_or_else(|| rejected(404, "PATCH", &path, "Cart item not found"))?;
        let current = backend
            .carts
            .get(&subject)
            .and_then(|lines| lines.get(index))
            .map_or(0, |line| i64::from(line.quantity));

        let updated = current + i64::from(delta);
        let Some(lines) = backend.carts.get_mut(&subject) else {
            return Err(rejected(404, "PATCH", &path, "Cart item not found"));
        };

        if updated <= 0 {
            lines.remove(index);
            return Ok(());
        }

        let limit = backend.max_quantity.unwrap_or(u32::MAX);
        let updated = u32::try_from(updated)
            .ok()
            .filter(|q| *q <= limit)
            .ok_or_else(|| rejected(409, "PATCH", &path, "Quantity limit exceeded"))?;
        if let Some(line) = backend
            .carts
            .get_mut(&subject)
            .and_then(|lines| lines.get_mut(index))
        {
            line.quantity = updated;
        }
        Ok(())
    }

    async fn remove(&self, line_id: &LineId) -> Result<(), CartError> {
        let path = format!("/cart/{line_id}");

        self.enter(GatewayOp::Remove).await?;
        let mut backend = self.backend();

        let (subject, index) = backend
            .find_line(line_id)
            .ok_or_else(|| rejected(404, "DELETE", &path, "Cart item not found"))?;
        if let Some(lines) = backend.carts.get_mut(&subject) {
            lines.remove(index);
        }
        Ok(())
    }

    async fn clear(&self, subject: SubjectId) -> Result<(), CartError> {
        self.enter(GatewayOp::Clear).await?;
        let mut backend = self.backend();
        backend.carts.remove(&subject);
        Ok(())
    }

    async fn checkout(&self, subject: SubjectId) -> Result<CheckoutReceipt, CartError> {
        self.enter(GatewayOp::Checkout).await?;
        let mut backend = self.backend();

        let cart = backend.snapshot(subject)?;
        if cart.is_empty() {
            return Err(rejected(400, "POST", "/checkout", "Cart is empty"));
        }

        let total_amount: Decimal = cart.total_price();
        backend.carts.remove(&subject);
        backend.next_order += 1;

        Ok(CheckoutReceipt {
            order_id: OrderId::new(format!("ord-{}", backend.next_order)),
            total_amount,
        })
    }
}

fn rejected(status: u16, method: &str, path: &str, message: &str) -> CartError {
    CartError::Rejected {
        status,
        method: method.to_string(),
        path: path.to_string(),
        message: Some(message.to_string()),
        body: ResponseBody::Json(serde_json::json!({ "message": message })),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALICE: SubjectId = SubjectId::new(1);
    const BOB: SubjectId = SubjectId::new(2);

    fn price(amount: i64) -> UnitPrice {
        UnitPrice::new(Decimal::from(amount)).unwrap()
    }

    fn add(subject: SubjectId, target: &str, source: SourceKind, quantity: u32) -> AddLine {
        AddLine {
            target_id: TargetId::new(target),
            source_kind: source,
            quantity: NonZeroU32::new(quantity).unwrap(),
            subject,
        }
    }

    fn gateway() -> InMemoryCartGateway {
        let gateway = InMemoryCartGateway::new();
        gateway.stock("1", SourceKind::Product, CatalogEntry::new("Mug", price(10)));
        gateway.stock("1", SourceKind::GalleryArtwork, CatalogEntry::new("Dusk", price(5)));
        gateway
    }

    #[tokio::test]
    async fn test_add_merges_same_target() {
        let gateway = gateway();
        gateway.add(&add(ALICE, "1", SourceKind::Product, 1)).await.unwrap();
        gateway.add(&add(ALICE, "1", SourceKind::Product, 2)).await.unwrap();
        gateway.add(&add(ALICE, "1", SourceKind::GalleryArtwork, 1)).await.unwrap();

        let cart = gateway.fetch(ALICE).await.unwrap();
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.quantity_for(SourceKind::Product), 3);
        assert_eq!(cart.quantity_for(SourceKind::GalleryArtwork), 1);
    }

    #[tokio::test]
    async fn test_carts_are_per_subject() {
        let gateway = gateway();
        gateway.add(&add(ALICE, "1", SourceKind::Product, 1)).await.unwrap();

        assert!(gateway.fetch(BOB).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected() {
        let gateway = gateway();
        let err = gateway
            .add(&add(ALICE, "404", SourceKind::Product, 1))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.user_message(), "Target not found");
    }

    #[tokio::test]
    async fn test_line_ids_are_never_reused() {
        let gateway = gateway();
        gateway.add(&add(ALICE, "1", SourceKind::Product, 1)).await.unwrap();
        let first = gateway.fetch(ALICE).await.unwrap().lines()[0].line_id.clone();
        gateway.remove(&first).await.unwrap();

        gateway.add(&add(ALICE, "1", SourceKind::Product, 1)).await.unwrap();
        let second = gateway.fetch(ALICE).await.unwrap().lines()[0].line_id.clone();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_change_quantity_deletes_at_zero() {
        let gateway = gateway();
        gateway.add(&add(ALICE, "1", SourceKind::Product, 2)).await.unwrap();
        let line = gateway.fetch(ALICE).await.unwrap().lines()[0].line_id.clone();

        gateway.change_quantity(&line, -1).await.unwrap();
        assert_eq!(gateway.fetch(ALICE).await.unwrap().total_quantity(), 1);

        gateway.change_quantity(&line, -5).await.unwrap();
        assert!(gateway.fetch(ALICE).await.unwrap().is_empty());

        let err = gateway.change_quantity(&line, 1).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_quantity_limit() {
        let gateway = gateway();
        gateway.set_max_quantity(Some(2));
        gateway.add(&add(ALICE, "1", SourceKind::Product, 2)).await.unwrap();

        let err = gateway
            .add(&add(ALICE, "1", SourceKind::Product, 1))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(gateway.server_cart(ALICE).unwrap().total_quantity(), 2);
    }

    #[tokio::test]
    async fn test_fail_next_fails_once() {
        let gateway = gateway();
        gateway.fail_next(GatewayOp::Fetch);

        assert!(matches!(
            gateway.fetch(ALICE).await,
            Err(CartError::Unavailable(_))
        ));
        assert!(gateway.fetch(ALICE).await.is_ok());
        assert_eq!(gateway.calls().fetch, 2);
        assert_eq!(gateway.calls().total(), 2);
    }

    #[tokio::test]
    async fn test_checkout_empties_cart() {
        let gateway = gateway();
        gateway.add(&add(ALICE, "1", SourceKind::Product, 2)).await.unwrap();
        gateway.add(&add(ALICE, "1", SourceKind::GalleryArtwork, 3)).await.unwrap();

        let receipt = gateway.checkout(ALICE).await.unwrap();
        assert_eq!(receipt.total_amount, Decimal::from(35));
        assert!(gateway.server_cart(ALICE).unwrap().is_empty());

        let err = gateway.checkout(ALICE).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_prices_follow_catalog() {
        let gateway = gateway();
        gateway.add(&add(ALICE, "1", SourceKind::Product, 2)).await.unwrap();
        gateway.set_price(&TargetId::new("1"), SourceKind::Product, price(12));

        assert_eq!(
            gateway.fetch(ALICE).await.unwrap().total_price(),
            Decimal::from(24)
        );
    }

    #[tokio::test]
    async fn test_held_fetch_waits_for_release() {
        let gateway = std::sync::Arc::new(gateway());
        let release = gateway.hold_next(GatewayOp::Fetch);

        let pending = tokio::spawn({
            let gateway = std::sync::Arc::clone(&gateway);
            async move { gateway.fetch(ALICE).await }
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        release.release();
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_held_add_is_counted_but_not_applied() {
        let gateway = std::sync::Arc::new(gateway());
        let release = gateway.hold_next(GatewayOp::Add);

        let pending = tokio::spawn({
            let gateway = std::sync::Arc::clone(&gateway);
            async move { gateway.add(&add(ALICE, "1", SourceKind::Product, 1)).await }
        });
        while gateway.calls().add == 0 {
            tokio::task::yield_now().await;
        }
        assert!(gateway.server_cart(ALICE).unwrap().is_empty());

        release.release();
        pending.await.unwrap().unwrap();
        assert_eq!(gateway.server_cart(ALICE).unwrap().line_count(), 1);
    }
}
