//! Submission gateway client
//!
//! The acknowledgment contract matters here: an action is confirmed only
//! when the gateway's response body parses as a persisted record carrying a
//! non-empty catch id. A transport-level 2xx without that body leaves the
//! action queued. A 409 means the catch already reached the server on an
//! earlier, partially acknowledged drain - confirmed as well.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::model::{CatchDraft, CatchRecordAck};
use crate::types::{Result, SkiffError};

/// Outcome of submitting one draft to the gateway
#[derive(Debug, Clone)]
pub enum SubmitAck {
    /// Persisted; the record carries the assigned catch id
    Persisted(CatchRecordAck),
    /// The catch id is already on the server (earlier drain succeeded)
    Duplicate,
    /// Structural validation rejected the draft; it will never succeed
    Rejected(Vec<String>),
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn submit(&self, draft: &CatchDraft) -> Result<SubmitAck>;

    /// Cheap connectivity probe against the gateway's health endpoint
    async fn is_reachable(&self) -> bool;
}

/// Connection settings for the gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValidationBody {
    #[serde(default)]
    errors: Vec<ValidationEntry>,
}

#[derive(Debug, Deserialize)]
struct ValidationEntry {
    #[serde(default)]
    field: String,
    #[serde(default)]
    message: String,
}

/// HTTP client for the Landing gateway
pub struct HttpGatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SkiffError::Config(format!("gateway client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn submit(&self, draft: &CatchDraft) -> Result<SubmitAck> {
        let url = format!("{}/catches", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(draft)
            .send()
            .await
            .map_err(|e| SkiffError::Gateway(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::CONFLICT {
            return Ok(SubmitAck::Duplicate);
        }

        if status == StatusCode::BAD_REQUEST {
            let errors = response
                .json::<ValidationBody>()
                .await
                .map(|body| {
                    body.errors
                        .into_iter()
                        .map(|e| format!("{}: {}", e.field, e.message))
                        .collect()
                })
                .unwrap_or_default();
            return Ok(SubmitAck::Rejected(errors));
        }

        if !status.is_success() {
            return Err(SkiffError::Gateway(format!(
                "gateway returned {status}"
            )));
        }

        // Persistence is confirmed by the body, not the status code
        let ack = response
            .json::<CatchRecordAck>()
            .await
            .map_err(|e| SkiffError::Gateway(format!("unparseable response: {e}")))?;
        if ack.catch_id.is_empty() {
            return Err(SkiffError::Gateway(
                "response carried no catch_id".to_string(),
            ));
        }

        debug!(catch_id = %ack.catch_id, "Gateway confirmed persistence");
        Ok(SubmitAck::Persisted(ack))
    }

    async fn is_reachable(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
