//! Configuration for Landing
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Landing - submission gateway and ledger relay for catch provenance
#[derive(Parser, Debug, Clone)]
#[command(name = "landing")]
#[command(about = "Submission gateway and ledger relay for catch records")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "landing")]
    pub mongodb_db: String,

    /// Base URL of the ledger bridge REST service
    #[arg(long, env = "LEDGER_URL", default_value = "http://localhost:3001")]
    pub ledger_url: String,

    /// Per-call ledger request timeout in milliseconds
    #[arg(long, env = "LEDGER_TIMEOUT_MS", default_value = "10000")]
    pub ledger_timeout_ms: u64,

    /// Number of in-process relay workers (0 = gateway only, rely on
    /// standalone landing-relay processes)
    #[arg(long, env = "RELAY_WORKERS", default_value = "1")]
    pub relay_workers: usize,

    /// Relay queue poll interval in milliseconds
    #[arg(long, env = "RELAY_POLL_MS", default_value = "1000")]
    pub relay_poll_ms: u64,

    /// In-flight claim lease in seconds; claims older than this are
    /// considered abandoned and reclaimable
    #[arg(long, env = "RELAY_CLAIM_LEASE_SECS", default_value = "120")]
    pub relay_claim_lease_secs: u64,

    /// Enable development mode (in-memory store when MongoDB is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "65536")]
    pub max_body_bytes: usize,
}

impl Args {
    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay_poll_ms)
    }

    pub fn relay_claim_lease(&self) -> Duration {
        Duration::from_secs(self.relay_claim_lease_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ledger_url.is_empty() {
            return Err("LEDGER_URL must not be empty".to_string());
        }
        if !self.ledger_url.starts_with("http://") && !self.ledger_url.starts_with("https://") {
            return Err("LEDGER_URL must be an http(s) URL".to_string());
        }
        if self.ledger_timeout_ms == 0 {
            return Err("LEDGER_TIMEOUT_MS must be positive".to_string());
        }
        if self.relay_poll_ms == 0 {
            return Err("RELAY_POLL_MS must be positive".to_string());
        }
        if self.relay_claim_lease_secs == 0 {
            return Err("RELAY_CLAIM_LEASE_SECS must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let args = Args::parse_from(["landing"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.relay_workers, 1);
        assert_eq!(args.ledger_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_non_http_ledger_url() {
        let args = Args::parse_from(["landing", "--ledger-url", "ws://nope:1234"]);
        assert!(args.validate().is_err());
    }
}
