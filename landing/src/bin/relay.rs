//! Landing Relay - standalone ledger relay worker
//!
//! Runs the relay handshake loop against the shared MongoDB relay queue.
//! Any number of these can run alongside the gateway; the atomic job claim
//! keeps attempts per catch id strictly sequential.
//!
//! Usage:
//!   landing-relay --mongodb-uri mongodb://localhost:27017 --ledger-url http://localhost:3001

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use landing::{
    db::{MongoClient, MongoStore},
    ledger::{HttpLedgerClient, LedgerConfig},
    relay::{RelayConfig, RelayWorker},
};

#[derive(Parser, Debug)]
#[command(name = "landing-relay")]
#[command(about = "Standalone ledger relay worker for Landing")]
#[command(version)]
struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "landing")]
    mongodb_db: String,

    /// Base URL of the ledger bridge REST service
    #[arg(long, env = "LEDGER_URL", default_value = "http://localhost:3001")]
    ledger_url: String,

    /// Per-call ledger request timeout in milliseconds
    #[arg(long, env = "LEDGER_TIMEOUT_MS", default_value = "10000")]
    ledger_timeout_ms: u64,

    /// Unique worker ID (auto-generated if not provided)
    #[arg(long, env = "WORKER_ID")]
    worker_id: Option<String>,

    /// Relay queue poll interval in milliseconds
    #[arg(long, env = "RELAY_POLL_MS", default_value = "1000")]
    relay_poll_ms: u64,

    /// In-flight claim lease in seconds
    #[arg(long, env = "RELAY_CLAIM_LEASE_SECS", default_value = "120")]
    relay_claim_lease_secs: u64,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,landing=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let worker_id = args
        .worker_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(
        "Starting Landing relay worker {} (MongoDB: {}, Ledger: {})",
        worker_id, args.mongodb_uri, args.ledger_url
    );

    let client = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => client,
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };
    let store = match MongoStore::new(client).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Store initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let ledger = match HttpLedgerClient::new(LedgerConfig {
        base_url: args.ledger_url.clone(),
        request_timeout: std::time::Duration::from_millis(args.ledger_timeout_ms),
    }) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Ledger client initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let worker = Arc::new(RelayWorker::new(
        store.clone(),
        store,
        ledger,
        RelayConfig {
            worker_id,
            poll_interval: std::time::Duration::from_millis(args.relay_poll_ms),
            claim_lease: std::time::Duration::from_secs(args.relay_claim_lease_secs),
            ..Default::default()
        },
    ));

    let run_worker = Arc::clone(&worker);
    let worker_handle = tokio::spawn(async move { run_worker.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            worker.stop().await;
        }
        result = worker_handle => {
            if let Err(e) = result {
                error!("Worker task error: {}", e);
            }
        }
    }

    info!("Relay worker shutting down");
}
