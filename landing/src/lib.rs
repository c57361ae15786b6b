//! Landing - submission gateway and ledger relay for catch provenance
//!
//! Landing is the shore side of the catch provenance system: field clients
//! submit catch records over HTTP, the gateway persists them to the primary
//! store and enqueues a relay job, and relay workers forward each record to
//! the provenance ledger through an idempotent, retried handshake.
//!
//! ## Services
//!
//! - **Gateway**: `POST /catches` persists first, relays asynchronously
//! - **Relay queue**: persistent per-catch job queue with atomic claims
//! - **Relay worker**: ledger handshake loop with bounded retry/backoff
//! - **Ledger adapter**: narrow REST client for the ledger bridge

pub mod config;
pub mod db;
pub mod ledger;
pub mod relay;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{LandingError, Result};
