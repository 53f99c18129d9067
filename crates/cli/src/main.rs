//! Shopsync CLI - Migrations and sync operations.
//!
//! # Usage
//!
//! ```bash
//! # Create or update the sync schema
//! shopsync migrate
//!
//! # Import products, then orders, for every installed store
//! shopsync sync products
//! shopsync sync orders
//!
//! # Remove a store's imported orders
//! shopsync purge --store-id 3 --entities orders
//!
//! # Re-read shop settings and record remote order totals
//! shopsync update-stores --order-count
//!
//! # Clear a lock left by a crashed walk
//! shopsync unlock --store-id 3 --family orders
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `sync` - Run a sync pass for one entity family
//! - `purge` - Delete a store's imported data
//! - `update-stores` - Refresh shop settings and remote totals
//! - `unlock` - Release a store lock
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

#![cfg_attr(not(test), forbid(unsafe_code))]

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use shopsync_core::{ExecutionMode, StoreId, SyncFamily};
use shopsync_engine::EngineConfig;
use shopsync_engine::models::PurgeTarget;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliError;
use commands::sync::SyncOptions;
use commands::update_stores::UpdateStoresOptions;

#[derive(Parser)]
#[command(name = "shopsync")]
#[command(author, version, about = "Shopify store data import")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Run a sync pass for one entity family
    Sync {
        /// Entity family (`orders` or `products`)
        family: SyncFamily,

        /// Only sync these stores (comma separated)
        #[arg(long, value_delimiter = ',')]
        store_ids: Vec<StoreId>,

        /// Fetch records created at or after this RFC 3339 time instead of
        /// the stored watermark
        #[arg(long)]
        created_at_min: Option<DateTime<Utc>>,

        /// Page size
        #[arg(long)]
        limit: Option<u32>,

        /// Decide everything, write nothing
        #[arg(long)]
        dry_run: bool,

        /// `immediate` or `deferred`
        #[arg(long, default_value = "immediate")]
        mode: ExecutionMode,

        /// Queue workers in deferred mode
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Delete a store's imported data
    Purge {
        #[arg(long)]
        store_id: StoreId,

        /// Any of `orders`, `customers`, `products`, `store` (default: all)
        #[arg(long, value_delimiter = ',')]
        entities: Vec<PurgeTarget>,
    },
    /// Refresh shop settings and remote totals
    UpdateStores {
        /// Only refresh these stores (comma separated)
        #[arg(long, value_delimiter = ',')]
        store_ids: Vec<StoreId>,

        /// Only refresh stores last updated before this RFC 3339 time
        #[arg(long)]
        updated_at_max: Option<DateTime<Utc>>,

        /// Record the remote customer total
        #[arg(long)]
        customer_count: bool,

        /// Record the remote order total
        #[arg(long)]
        order_count: bool,

        /// Record the remote product total
        #[arg(long)]
        product_count: bool,
    },
    /// Release a store lock
    Unlock {
        #[arg(long)]
        store_id: StoreId,

        #[arg(long)]
        family: SyncFamily,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &EngineConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
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
        .unwrap_or_else(|_| "shopsync_engine=info,shopsync_cli=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter));

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Sentry must be initialized before the tracing subscriber
    let config = EngineConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &EngineConfig) -> Result<(), CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run(config).await,
        Commands::Sync {
            family,
            store_ids,
            created_at_min,
            limit,
            dry_run,
            mode,
            workers,
        } => {
            let options = SyncOptions {
                family,
                store_ids,
                created_at_min,
                limit,
                dry_run,
                mode,
                workers,
            };
            commands::sync::run(config, options).await
        }
        Commands::Purge { store_id, entities } => {
            commands::purge::run(config, store_id, &entities).await
        }
        Commands::UpdateStores {
            store_ids,
            updated_at_max,
            customer_count,
            order_count,
            product_count,
        } => {
            let options = UpdateStoresOptions {
                store_ids,
                updated_at_max,
                customer_count,
                order_count,
                product_count,
            };
            commands::update_stores::run(config, &options).await
        }
        Commands::Unlock { store_id, family } => {
            commands::unlock::run(config, store_id, family).await
        }
    }
}
