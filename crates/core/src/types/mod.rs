//! Core types for Atelier.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod identity;
pub mod price;
pub mod source;

pub use cart::{CartLine, CartSnapshot, SnapshotError, SourceQuantities};
pub use id::*;
pub use identity::{Identity, IdentityKind};
pub use price::{PriceError, UnitPrice};
pub use source::SourceKind;
