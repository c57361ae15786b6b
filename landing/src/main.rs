//! Landing - submission gateway for catch provenance

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use landing::{
    config::Args,
    db::{MemoryStore, MongoClient, MongoStore},
    db::store::RecordStore,
    ledger::{HttpLedgerClient, LedgerConfig, LedgerService},
    relay::{queue::JobStore, RelayConfig, RelayWorker},
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("landing={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Landing - Catch Provenance Gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Ledger bridge: {}", args.ledger_url);
    info!("Relay workers (in-process): {}", args.relay_workers);
    info!("======================================");

    // Connect the primary store; dev mode falls back to an in-memory store
    // so the gateway can run without infrastructure.
    let (records, jobs, mongo_backed): (Arc<dyn RecordStore>, Arc<dyn JobStore>, bool) =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                let store = Arc::new(MongoStore::new(client).await?);
                info!("MongoDB connected successfully");
                (store.clone(), store, true)
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                    let store = Arc::new(MemoryStore::new());
                    (store.clone(), store, false)
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    // Ledger adapter, constructed explicitly from config and shared with
    // the in-process workers.
    let ledger: Arc<dyn LedgerService> = Arc::new(HttpLedgerClient::new(LedgerConfig {
        base_url: args.ledger_url.clone(),
        request_timeout: args.ledger_timeout(),
    })?);

    // In-process relay workers. Deployments that scale the relay separately
    // set RELAY_WORKERS=0 and run landing-relay processes instead.
    for i in 0..args.relay_workers {
        let worker = RelayWorker::new(
            Arc::clone(&jobs),
            Arc::clone(&records),
            Arc::clone(&ledger),
            RelayConfig {
                worker_id: format!("{}-{}", args.node_id, i),
                poll_interval: args.relay_poll_interval(),
                claim_lease: args.relay_claim_lease(),
                ..Default::default()
            },
        );
        tokio::spawn(async move { worker.run().await });
    }
    if args.relay_workers > 0 {
        info!("Started {} in-process relay worker(s)", args.relay_workers);
    }

    let state = Arc::new(server::AppState::new(args, records, jobs, mongo_backed));

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
