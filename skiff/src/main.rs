//! Skiff - field client for catch capture

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skiff::config::{Args, Command};
use skiff::gateway::{GatewayClient, HttpGatewayClient, SubmitAck};
use skiff::dispatcher::{Dispatcher, DispatcherConfig};
use skiff::gateway::GatewayConfig;
use skiff::queue::OfflineQueue;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("skiff={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let queue = Arc::new(match &args.data_dir {
        Some(dir) => OfflineQueue::open(dir.join("queue.sled"))?,
        None => OfflineQueue::open_default()?,
    });

    let gateway = Arc::new(HttpGatewayClient::new(GatewayConfig {
        base_url: args.gateway_url.clone(),
        request_timeout: args.gateway_timeout(),
    })?);

    match args.command.clone() {
        Command::Capture(capture) => {
            let offline = capture.offline;
            let draft = capture.into_draft();

            if !offline && gateway.is_reachable().await {
                match gateway.submit(&draft).await {
                    Ok(SubmitAck::Persisted(ack)) => {
                        info!(catch_id = %ack.catch_id, "Catch saved on server");
                        println!("saved: {}", ack.catch_id);
                        return Ok(());
                    }
                    Ok(SubmitAck::Duplicate) => {
                        info!("Catch already on server");
                        println!("saved: already on server");
                        return Ok(());
                    }
                    Ok(SubmitAck::Rejected(errors)) => {
                        for err in &errors {
                            eprintln!("rejected: {err}");
                        }
                        std::process::exit(1);
                    }
                    Err(e) => {
                        warn!("Direct submission failed, queueing locally: {}", e);
                    }
                }
            }

            // The capture is durable the moment it lands in the queue; the
            // dispatcher syncs it once connectivity returns.
            let action_id = queue.enqueue(draft)?;
            info!(action_id = %action_id, "Catch saved locally");
            println!("saved locally: {action_id} ({} pending)", queue.len());
        }

        Command::Drain => {
            let dispatcher = Dispatcher::new(queue, gateway, DispatcherConfig::default());
            let report = dispatcher.drain().await?;
            println!(
                "synced: {}, dropped: {}, remaining: {}",
                report.synced, report.dropped, report.remaining
            );
        }

        Command::Run => {
            let dispatcher = Arc::new(Dispatcher::new(
                queue,
                gateway,
                DispatcherConfig {
                    probe_interval: args.probe_interval(),
                    drain_interval: args.drain_interval(),
                },
            ));

            let run_dispatcher = Arc::clone(&dispatcher);
            let handle = tokio::spawn(async move { run_dispatcher.run().await });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    dispatcher.stop().await;
                }
                result = handle => {
                    if let Err(e) = result {
                        error!("Dispatcher task error: {}", e);
                    }
                }
            }

            info!("Dispatcher shutting down");
        }

        Command::Status => {
            let pending = queue.list_pending()?;
            println!("pending: {}", pending.len());
            for action in pending {
                println!(
                    "  {}  {}  {} ({:.1} kg, captured {})",
                    action.action_id,
                    action.payload.actor_id,
                    action.payload.species,
                    action.payload.weight,
                    action.captured_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }
    }

    Ok(())
}
