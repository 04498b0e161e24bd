//! Payrisk Server
//!
//! Accepts payment operations over HTTP and settles them through an
//! asynchronous risk evaluation pipeline.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::file::StoreBackend;
use config::{ConfigLoader, get_database_url};
use payrisk_core::bus::{InMemoryBus, LaneAssignment, MessageBus};
use payrisk_core::events::emit_command_channel;
use payrisk_core::processors::{
    DecisionEngine, EmitterHandle, RiskRequestEmitter, RiskResponseCorrelator,
};
use payrisk_core::store::{InMemoryOperationStore, OperationStoreRef, PgOperationStore};
use server::{build_router, run_server};
use shutdown::shutdown_signal;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Payrisk - payment operations with asynchronous risk evaluation
#[derive(Parser, Debug)]
#[command(name = "payrisk-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./payrisk-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting payrisk-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Operation store
    let (store, db_pool) = match config.store.backend {
        StoreBackend::Memory => {
            if args.migrate {
                tracing::warn!("--migrate ignored: store backend is memory");
            }
            tracing::info!("Using in-memory operation store");
            let store: OperationStoreRef = Arc::new(InMemoryOperationStore::new());
            (store, None)
        }
        StoreBackend::Postgres => {
            let database_url = get_database_url().map_err(|e| {
                tracing::error!("DATABASE_URL environment variable not set");
                e
            })?;

            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.store.max_connections)
                .connect(&database_url)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to database: {}", e);
                    e
                })?;
            tracing::info!("Database connection established");

            if args.migrate {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("../migrations")
                    .run(&db_pool)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to run migrations: {}", e);
                        e
                    })?;
                tracing::info!("Migrations completed successfully");
            }

            let store: OperationStoreRef = Arc::new(PgOperationStore::new(db_pool.clone()));
            (store, Some(db_pool))
        }
    };

    let bus = Arc::new(InMemoryBus::new(config.bus.partitions));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = JoinSet::new();

    // Request emitter
    let (commands_tx, commands_rx) = emit_command_channel();
    let emitter = RiskRequestEmitter::new(bus.clone(), config.bus.request_topic.clone());
    workers.spawn(emitter.run(commands_rx, shutdown_rx.clone()));

    // Decision engine
    if config.workers.decision_engine {
        let engine = Arc::new(DecisionEngine::new(
            bus.clone(),
            config.limits,
            config.bus.response_topic.clone(),
        ));
        let lanes = bus
            .subscribe(
                &config.bus.request_topic,
                &config.bus.request_group,
                LaneAssignment::SOLE,
            )
            .await?;
        workers.spawn(engine.run(lanes, config.retry, shutdown_rx.clone()));
    } else {
        tracing::warn!("Decision engine disabled; risk requests will not be evaluated here");
    }

    // Response correlator
    if config.workers.correlator {
        let correlator = Arc::new(RiskResponseCorrelator::new(store.clone()));
        let lanes = bus
            .subscribe(
                &config.bus.response_topic,
                &config.bus.response_group,
                LaneAssignment::SOLE,
            )
            .await?;
        workers.spawn(correlator.run(lanes, config.retry, shutdown_rx.clone()));
    } else {
        tracing::warn!("Correlator disabled; operations will not be settled here");
    }

    // Create application state and build the router
    let state = AppState::new(store, EmitterHandle::new(commands_tx));
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", config.listen);
    let result = run_server(router, config.listen, shutdown_signal()).await;

    // Stop the workers and let in-flight messages finish
    tracing::info!("Stopping workers...");
    shutdown_tx.send_replace(true);
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Worker task failed");
        }
    }

    // Close database connections gracefully
    if let Some(db_pool) = db_pool {
        tracing::info!("Closing database connections...");
        db_pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
