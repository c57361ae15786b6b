//! Relay queue visibility
//!
//! Dead-letter surface for the operational dashboard: exhausted jobs need
//! manual intervention, and the queue states are useful when diagnosing a
//! stuck relay. Read-only.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::catches::json_response;
use crate::db::schemas::RelayJobDoc;
use crate::server::AppState;
use relay_core::JobState;

/// Wire view of a relay job (payload omitted)
#[derive(Debug, Serialize)]
pub struct RelayJobView {
    pub catch_id: String,
    pub actor_id: String,
    pub state: String,
    pub attempt_count: i32,
    pub next_attempt_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<&RelayJobDoc> for RelayJobView {
    fn from(job: &RelayJobDoc) -> Self {
        Self {
            catch_id: job.catch_id.clone(),
            actor_id: job.actor_id.clone(),
            state: job.state.to_string(),
            attempt_count: job.attempt_count,
            next_attempt_at: job.next_attempt_at.try_to_rfc3339_string().ok(),
            last_error: job.last_error.clone(),
            created_at: job
                .metadata
                .created_at
                .and_then(|dt| dt.try_to_rfc3339_string().ok()),
        }
    }
}

/// `GET /relay/jobs?state=<state>` (default: exhausted)
pub async fn handle_list(state: Arc<AppState>, query: Option<&str>) -> Response<Full<Bytes>> {
    let requested = query
        .and_then(|q| {
            q.split('&')
                .find_map(|pair| pair.strip_prefix("state="))
        })
        .unwrap_or("exhausted");

    let Some(job_state) = JobState::parse(requested) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            &serde_json::json!({
                "error": format!("Unknown state '{requested}'"),
                "expected": ["queued", "in-flight", "succeeded", "exhausted"],
            }),
        );
    };

    match state.jobs.list_by_state(job_state).await {
        Ok(jobs) => {
            let views: Vec<RelayJobView> = jobs.iter().map(RelayJobView::from).collect();
            json_response(
                StatusCode::OK,
                &serde_json::json!({ "state": requested, "count": views.len(), "jobs": views }),
            )
        }
        Err(e) => {
            warn!("Relay job listing failed: {}", e);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({ "error": "Failed to list relay jobs" }),
            )
        }
    }
}
