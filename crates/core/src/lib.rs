//! Atelier Core - Shared cart types.
//!
//! This crate provides the types the cart synchronization engine and its
//! consumers agree on:
//! - `atelier-cart` - Gateway, reconciliation store and subscription bus
//! - `atelier-cli` - Command-line driver for the cart
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no shared mutable state. Wire formats live in `atelier-cart`, so
//! backend field churn never leaks into these types.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, prices, identities, cart lines and snapshots

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
