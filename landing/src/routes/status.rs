//! Health and status endpoints

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::catches::json_response;
use crate::server::AppState;
use relay_core::JobState;

/// Runtime status of the gateway and its relay queue
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub service: &'static str,
    pub version: &'static str,
    pub node_id: String,
    /// Backing store: "mongodb" or "memory" (dev mode)
    pub storage: &'static str,
    /// Jobs still awaiting a ledger outcome
    pub queue_depth: u64,
    /// Dead-letter jobs needing operator attention
    pub exhausted: usize,
}

/// `GET /health`
pub async fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
}

/// `GET /status`
pub async fn handle_status(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let queue_depth = state.jobs.queue_depth().await.unwrap_or(0);
    let exhausted = state
        .jobs
        .list_by_state(JobState::Exhausted)
        .await
        .map(|jobs| jobs.len())
        .unwrap_or(0);

    let report = StatusReport {
        service: "landing",
        version: env!("CARGO_PKG_VERSION"),
        node_id: state.args.node_id.to_string(),
        storage: if state.mongo_backed { "mongodb" } else { "memory" },
        queue_depth,
        exhausted,
    };

    json_response(StatusCode::OK, &report)
}
