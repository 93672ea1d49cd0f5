//! Backend-authoritative cart synchronization.
//!
//! - [`store::CartStore`] - the locally held cart and its state machine
//! - [`gateway`] - the backend cart contract with HTTP and in-memory implementations
//! - [`bus`] - change notifications for snapshot readers
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use atelier_cart::{CartStore, GatewayConfig, HttpCartGateway};
//! use atelier_core::{Identity, SourceKind, SubjectId, TargetId};
//!
//! let gateway = HttpCartGateway::new(&GatewayConfig::from_env()?)?;
//! let store = CartStore::new(Arc::new(gateway));
//!
//! store.identify(Identity::user(SubjectId::new(7))).await?;
//! store.add_item(TargetId::new("12"), SourceKind::Product, 1).await?;
//! println!("{} items", store.snapshot().total_quantity());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod store;

pub use bus::{Subscription, SubscriptionBus};
pub use config::{ConfigError, GatewayConfig};
pub use error::{CartError, ResponseBody};
pub use gateway::{CartGateway, CheckoutReceipt, HttpCartGateway, InMemoryCartGateway};
pub use store::{CartStore, SyncOutcome};
