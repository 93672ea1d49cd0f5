//! Cart Remote Gateway: the only code that talks to the backend cart endpoints.
//!
//! # Architecture
//!
//! - Stateless request/response, no caching, no retries
//! - The backend is the source of truth for lines, quantities and prices
//! - Wire records are converted to `atelier_core` types at this boundary, so
//!   backend field renames stay in [`wire`]
//!
//! # Implementations
//!
//! - [`HttpCartGateway`] - REST over HTTP(S) with `reqwest`
//! - [`InMemoryCartGateway`] - In-process backend for tests and local development
//!
//! # Endpoints
//!
//! | Operation | Method | Path |
//! |---|---|---|
//! | fetch | GET | `/cart?subject={id}` |
//! | add | POST | `/cart/add` |
//! | change quantity | PATCH | `/cart/{lineId}/quantity?delta={n}` |
//! | remove | DELETE | `/cart/{lineId}` |
//! | clear | DELETE | `/cart/clear?subject={id}` |
//! | checkout | POST | `/checkout` |

mod http;
mod memory;
pub mod wire;

pub use http::HttpCartGateway;
pub use memory::{CatalogEntry, GatewayCalls, GatewayOp, HeldCall, InMemoryCartGateway};

use std::num::NonZeroU32;

use async_trait::async_trait;
use atelier_core::{CartSnapshot, LineId, OrderId, SourceKind, SubjectId, TargetId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CartError;

/// Request to put units of a target into a subject's cart.
///
/// Identifies the target, never a line: the line may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLine {
    /// Purchasable thing to add.
    pub target_id: TargetId,
    /// Catalog of `target_id`.
    pub source_kind: SourceKind,
    /// Units to add.
    pub quantity: NonZeroU32,
    /// Cart owner.
    pub subject: SubjectId,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    /// Order created from the cart.
    pub order_id: OrderId,
    /// Amount charged, as computed by the backend.
    pub total_amount: Decimal,
}

/// Backend cart contract.
///
/// Every call either returns the parsed success payload or fails with a
/// [`CartError`]. Implementations must not retry and must not cache.
#[async_trait]
pub trait CartGateway: Send + Sync {
    /// Full cart of `subject`, in server order.
    async fn fetch(&self, subject: SubjectId) -> Result<CartSnapshot, CartError>;

    /// Add units of a target, merging into an existing line for the same target.
    async fn add(&self, request: &AddLine) -> Result<(), CartError>;

    /// Apply `delta` to a line's quantity. The backend deletes the line when
    /// the result drops to zero.
    async fn change_quantity(&self, line_id: &LineId, delta: i32) -> Result<(), CartError>;

    /// Delete a line.
    async fn remove(&self, line_id: &LineId) -> Result<(), CartError>;

    /// Delete every line of `subject`'s cart.
    async fn clear(&self, subject: SubjectId) -> Result<(), CartError>;

    /// Turn `subject`'s cart into an order. The backend empties the cart.
    async fn checkout(&self, subject: SubjectId) -> Result<CheckoutReceipt, CartError>;
}
