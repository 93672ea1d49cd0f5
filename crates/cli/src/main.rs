//! Atelier CLI - Drive the cart of one identity against a live backend.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart of subject 7
//! atelier --subject 7 show
//!
//! # Add two units of product 12
//! atelier --subject 7 add 12 --quantity 2
//!
//! # Add a gallery artwork to a guest cart
//! atelier --subject 40 --guest add 3 --source gallery
//!
//! # Change or remove a line
//! atelier --subject 7 inc 5
//! atelier --subject 7 dec 5
//! atelier --subject 7 remove 5
//!
//! # Empty the cart, or turn it into an order
//! atelier --subject 7 clear
//! atelier --subject 7 checkout
//! ```
//!
//! # Environment Variables
//!
//! - `ATELIER_API_BASE_URL`, `ATELIER_API_TIMEOUT_SECS`, `ATELIER_API_TOKEN` - Backend connection
//! - `ATELIER_SUBJECT` - Default for `--subject`
//! - `ATELIER_GUEST` - Default for `--guest`
//! - `SENTRY_DSN` - Report errors to Sentry
//! - `LOG_FORMAT` - `json` for JSON log lines
//! - `RUST_LOG` - Log filter (default: `atelier_cart=info,atelier_cli=info`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use atelier_core::{LineId, SourceKind, TargetId};
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(author, version, about = "Atelier cart client")]
struct Cli {
    /// Subject id the cart belongs to
    #[arg(long, env = "ATELIER_SUBJECT", global = true)]
    subject: Option<i64>,

    /// Treat the subject as a guest session
    #[arg(long, env = "ATELIER_GUEST", global = true)]
    guest: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cart
    Show,
    /// Add units of a product or artwork
    Add {
        /// Target id
        target: String,

        /// Catalog (`product` or `gallery`)
        #[arg(short, long, default_value = "product")]
        source: SourceKind,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Add one unit to a line
    Inc {
        /// Line id
        line: String,
    },
    /// Take one unit from a line
    Dec {
        /// Line id
        line: String,
    },
    /// Remove a line
    Remove {
        /// Line id
        line: String,
    },
    /// Empty the cart
    Clear,
    /// Turn the cart into an order
    Checkout,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|dsn| !dsn.is_empty())?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atelier_cart=info,atelier_cli=info".into());

    // Logs go to stderr; stdout is reserved for command output
    let fmt_layer = if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry();
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = commands::cart::connect(cli.subject, cli.guest).await?;

    match cli.command {
        Commands::Show => {}
        Commands::Add {
            target,
            source,
            quantity,
        } => {
            store
                .add_item(TargetId::new(target), source, quantity)
                .await?;
        }
        Commands::Inc { line } => {
            commands::cart::change_quantity(&store, &LineId::new(line), 1).await?;
        }
        Commands::Dec { line } => {
            commands::cart::change_quantity(&store, &LineId::new(line), -1).await?;
        }
        Commands::Remove { line } => store.remove_line(&LineId::new(line)).await?,
        Commands::Clear => store.clear_cart().await?,
        Commands::Checkout => {
            commands::cart::checkout(&store).await?;
            return Ok(());
        }
    }

    commands::cart::print_cart(&store.snapshot());
    Ok(())
}
