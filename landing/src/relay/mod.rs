//! Relay queue and worker
//!
//! The queue holds one persistent job per catch awaiting ledger submission;
//! workers claim due jobs atomically and run the idempotent ledger handshake
//! with bounded retry/backoff.

pub mod queue;
pub mod worker;

pub use queue::JobStore;
pub use worker::{RelayConfig, RelayWorker};
