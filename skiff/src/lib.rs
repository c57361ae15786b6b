//! Skiff - field client for catch capture
//!
//! Skiff records catch events at the point of capture, where connectivity
//! is unreliable. Captures taken offline land in a durable on-device queue;
//! the sync dispatcher drains the queue into the Landing submission gateway
//! whenever connectivity allows. An action leaves the queue only after the
//! gateway confirms persistence by returning the assigned catch id - a bare
//! transport 2xx is not an acknowledgment.

pub mod config;
pub mod dispatcher;
pub mod gateway;
pub mod model;
pub mod queue;
pub mod types;

pub use config::Args;
pub use dispatcher::{Dispatcher, DispatcherConfig, DrainReport};
pub use gateway::{GatewayClient, HttpGatewayClient, SubmitAck};
pub use queue::OfflineQueue;
pub use types::{Result, SkiffError};
