//! Configuration for Skiff
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::model::CatchDraft;

/// Skiff - field client for catch capture
#[derive(Parser, Debug, Clone)]
#[command(name = "skiff")]
#[command(about = "Capture catches in the field and sync them to the gateway")]
#[command(version)]
pub struct Args {
    /// Base URL of the Landing submission gateway
    #[arg(long, env = "GATEWAY_URL", default_value = "http://localhost:8080")]
    pub gateway_url: String,

    /// Directory for the durable offline queue (default: ~/.skiff)
    #[arg(long, env = "SKIFF_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Gateway request timeout in milliseconds
    #[arg(long, env = "GATEWAY_TIMEOUT_MS", default_value = "15000")]
    pub gateway_timeout_ms: u64,

    /// Connectivity probe interval in seconds
    #[arg(long, env = "PROBE_INTERVAL_SECS", default_value = "5")]
    pub probe_interval_secs: u64,

    /// Fallback drain interval in seconds
    #[arg(long, env = "DRAIN_INTERVAL_SECS", default_value = "30")]
    pub drain_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Record a catch: submits directly when online, queues otherwise
    Capture(CaptureArgs),
    /// Run one drain pass over the offline queue
    Drain,
    /// Run the sync dispatcher loop
    Run,
    /// Show offline queue status
    Status,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Submitting actor (fisher) id
    #[arg(long, env = "ACTOR_ID")]
    pub actor_id: String,

    #[arg(long, env = "ACTOR_NAME")]
    pub actor_name: Option<String>,

    #[arg(long)]
    pub species: String,

    /// Weight in kilograms
    #[arg(long)]
    pub weight: f64,

    /// Harvest date (YYYY-MM-DD)
    #[arg(long)]
    pub harvest_date: String,

    /// One of: sun, smoke, freeze
    #[arg(long)]
    pub drying_method: String,

    #[arg(long)]
    pub batch_size: f64,

    /// Shelf life in days
    #[arg(long)]
    pub shelf_life: i32,

    #[arg(long)]
    pub price: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lng: f64,

    /// Reference to an already-uploaded image (repeatable)
    #[arg(long = "image-url")]
    pub image_urls: Vec<String>,

    /// Client-side id hint; the server-assigned id is canonical
    #[arg(long)]
    pub catch_id: Option<String>,

    /// Queue locally without trying the network
    #[arg(long, default_value = "false")]
    pub offline: bool,
}

impl CaptureArgs {
    pub fn into_draft(self) -> CatchDraft {
        CatchDraft {
            catch_id: self.catch_id,
            actor_id: self.actor_id,
            actor_name: self.actor_name,
            species: self.species,
            weight: self.weight,
            harvest_date: self.harvest_date,
            drying_method: self.drying_method,
            batch_size: self.batch_size,
            shelf_life: self.shelf_life,
            price: self.price,
            lat: self.lat,
            lng: self.lng,
            image_urls: self.image_urls,
        }
    }
}

impl Args {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.gateway_url.starts_with("http://") && !self.gateway_url.starts_with("https://") {
            return Err("GATEWAY_URL must be an http(s) URL".to_string());
        }
        if self.probe_interval_secs == 0 {
            return Err("PROBE_INTERVAL_SECS must be positive".to_string());
        }
        if self.drain_interval_secs == 0 {
            return Err("DRAIN_INTERVAL_SECS must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_args_map_to_draft() {
        let args = Args::parse_from([
            "skiff",
            "capture",
            "--actor-id",
            "fisher-1",
            "--species",
            "tilapia",
            "--weight",
            "12.5",
            "--harvest-date",
            "2026-08-01",
            "--drying-method",
            "sun",
            "--batch-size",
            "3",
            "--shelf-life",
            "30",
            "--price",
            "450",
            "--lat",
            "-6.8",
            "--lng",
            "39.2",
            "--image-url",
            "https://img.example/1.jpg",
        ]);
        assert!(args.validate().is_ok());

        let Command::Capture(capture) = args.command else {
            panic!("expected capture subcommand");
        };
        let draft = capture.into_draft();
        assert_eq!(draft.actor_id, "fisher-1");
        assert_eq!(draft.species, "tilapia");
        assert_eq!(draft.image_urls.len(), 1);
        assert!(draft.catch_id.is_none());
    }

    #[test]
    fn rejects_non_http_gateway_url() {
        let args = Args::parse_from(["skiff", "--gateway-url", "ftp://nope", "status"]);
        assert!(args.validate().is_err());
    }
}
