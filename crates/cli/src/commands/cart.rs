//! Cart commands.
//!
//! Every command adopts the identity given on the command line, which loads
//! its cart, then runs one store operation.

use std::sync::Arc;

use atelier_cart::{CartError, CartStore, ConfigError, GatewayConfig, HttpCartGateway};
use atelier_core::{CartSnapshot, Identity, LineId, SubjectId};
use thiserror::Error;

/// Errors that can occur while running a cart command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No subject given.
    #[error("No subject given. Pass --subject or set ATELIER_SUBJECT")]
    MissingSubject,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cart backend error.
    #[error("{}", .0.user_message())]
    Cart(#[from] CartError),

    /// Line id is not in the cart.
    #[error("No line {0} in the cart")]
    UnknownLine(LineId),
}

/// Build a store for the given subject and load its cart.
pub async fn connect(subject: Option<i64>, guest: bool) -> Result<CartStore, CommandError> {
    let subject = SubjectId::new(subject.ok_or(CommandError::MissingSubject)?);
    let identity = if guest {
        Identity::guest(subject)
    } else {
        Identity::user(subject)
    };

    let config = GatewayConfig::from_env()?;
    tracing::debug!(?config, "Loaded gateway configuration");

    let store = CartStore::new(Arc::new(HttpCartGateway::new(&config)?));
    store.identify(identity).await?;
    Ok(store)
}

/// Change a line's quantity, failing if the line is not in the cart.
pub async fn change_quantity(
    store: &CartStore,
    line_id: &LineId,
    delta: i32,
) -> Result<(), CommandError> {
    if store.snapshot().find_line(line_id).is_none() {
        return Err(CommandError::UnknownLine(line_id.clone()));
    }
    store.change_quantity(line_id, delta).await?;
    Ok(())
}

/// Check out and print the receipt.
#[allow(clippy::print_stdout)]
pub async fn checkout(store: &CartStore) -> Result<(), CommandError> {
    match store.checkout().await? {
        Some(receipt) => {
            println!("Order {} placed, total {:.2}", receipt.order_id, receipt.total_amount);
        }
        None => println!("Cart is empty, nothing to check out"),
    }
    Ok(())
}

/// Print the cart as a table with totals.
#[allow(clippy::print_stdout)]
pub fn print_cart(cart: &CartSnapshot) {
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }

    println!("{:<8} {:<16} {:<32} {:>5} {:>10}", "LINE", "SOURCE", "NAME", "QTY", "TOTAL");
    for line in cart.lines() {
        println!(
            "{:<8} {:<16} {:<32} {:>5} {:>10.2}",
            line.line_id,
            line.source,
            line.display_name,
            line.quantity,
            line.line_total()
        );
    }

    let quantities = cart.quantities();
    println!();
    println!(
        "{} items ({} products, {} artworks), total {:.2}",
        cart.total_quantity(),
        quantities.products,
        quantities.gallery,
        cart.total_price()
    );
}
