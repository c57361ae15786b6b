//! HTTP client for the ledger bridge
//!
//! The bridge is a thin REST service in front of the ledger network's
//! transaction-submission and query endpoints:
//!
//! - `GET  /api/catches/{catch_id}?fisherId=` - existence check
//! - `POST /api/fishers`                      - actor registration
//! - `POST /api/catches`                      - transaction submission
//!
//! Numeric payload fields are stringified per the bridge's encoding. A 409
//! response (or a body with `status: "exists"`) is the structured duplicate
//! signal; other 4xx responses are permanent rejections; timeouts, connect
//! errors and 5xx responses are transient.

use relay_core::{ErrorClass, LedgerReceipt};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CatchPayload, LedgerError, LedgerResult, LedgerService, SubmitOutcome};
use crate::types::{LandingError, Result};

/// Connection settings for the ledger bridge.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL of the bridge, e.g. `http://localhost:3001`
    pub base_url: String,
    /// Bounded per-call timeout; a timeout is classified transient
    pub request_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Response envelope of the ledger bridge.
#[derive(Debug, Deserialize)]
struct BridgeResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "transactionId")]
    transaction_id: Option<String>,
    #[serde(default, rename = "blockNumber")]
    block_number: Option<i64>,
}

/// REST adapter for the ledger network.
///
/// Holds its own `reqwest::Client`; constructed from configuration and
/// passed to each worker, never shared through a global.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LandingError::Config(format!("ledger client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn transport_error(err: reqwest::Error) -> LedgerError {
        // Request never reached a classifiable response; worth retrying.
        LedgerError::transient(format!("ledger bridge unreachable: {err}"))
    }

    async fn parse_body(response: reqwest::Response) -> (StatusCode, Option<BridgeResponse>) {
        let status = response.status();
        let body = response.json::<BridgeResponse>().await.ok();
        (status, body)
    }

    fn classify(status: StatusCode, body: &Option<BridgeResponse>) -> ErrorClass {
        let body_status = body.as_ref().and_then(|b| b.status.as_deref());
        ErrorClass::from_response(status.as_u16(), body_status)
    }

    fn error_from(status: StatusCode, body: Option<BridgeResponse>) -> LedgerError {
        let class = Self::classify(status, &body);
        let message = body
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("ledger bridge returned {status}"));
        LedgerError { class, message }
    }
}

#[async_trait::async_trait]
impl LedgerService for HttpLedgerClient {
    async fn exists(&self, actor_id: &str, catch_id: &str) -> LedgerResult<bool> {
        let url = format!("{}/api/catches/{catch_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("fisherId", actor_id)])
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if status.is_success() {
            debug!(catch_id = %catch_id, "catch already present on ledger");
            return Ok(true);
        }

        let (status, body) = Self::parse_body(response).await;
        Err(Self::error_from(status, body))
    }

    async fn ensure_actor(&self, actor_id: &str, name: &str) -> LedgerResult<()> {
        let url = format!("{}/api/fishers", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "fisherId": actor_id, "name": name }))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let (status, body) = Self::parse_body(response).await;
        if status.is_success() {
            return Ok(());
        }
        match Self::classify(status, &body) {
            // Already registered: success, not an error
            ErrorClass::AlreadyExists => Ok(()),
            _ => Err(Self::error_from(status, body)),
        }
    }

    async fn submit_catch(&self, payload: &CatchPayload) -> LedgerResult<SubmitOutcome> {
        let url = format!("{}/api/catches", self.base_url);
        let body = json!({
            "catch_id": payload.catch_id,
            "fisher_id": payload.actor_id,
            "species": payload.species,
            "weight": payload.weight_kg.to_string(),
            "harvest_date": payload.harvest_date.to_string(),
            "drying_method": payload.drying_method,
            "batch_size": payload.batch_size.to_string(),
            "shelf_life": payload.shelf_life_days.to_string(),
            "price": payload.price.to_string(),
            "lat": payload.lat.to_string(),
            "lng": payload.lng.to_string(),
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let (status, parsed) = Self::parse_body(response).await;

        if status.is_success() {
            let parsed = parsed.unwrap_or(BridgeResponse {
                status: None,
                message: None,
                transaction_id: None,
                block_number: None,
            });
            // Some bridge deployments omit the receipt fields; fall back to
            // a deterministic id so the record still carries a reference.
            let receipt = match parsed.transaction_id {
                Some(txn) => LedgerReceipt::new(txn, parsed.block_number.unwrap_or(0)),
                None => {
                    warn!(catch_id = %payload.catch_id, "ledger bridge omitted transaction id");
                    LedgerReceipt::placeholder(&payload.catch_id)
                }
            };
            return Ok(SubmitOutcome::Committed(receipt));
        }

        match Self::classify(status, &parsed) {
            ErrorClass::AlreadyExists => Ok(SubmitOutcome::AlreadyExists),
            _ => Err(Self::error_from(status, parsed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = HttpLedgerClient::new(LedgerConfig {
            base_url: "http://ledger:3001/".to_string(),
            request_timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(client.base_url, "http://ledger:3001");
    }

    #[test]
    fn error_classification_uses_body_status() {
        let body = Some(BridgeResponse {
            status: Some("exists".to_string()),
            message: Some("Catch already exists".to_string()),
            transaction_id: None,
            block_number: None,
        });
        assert_eq!(
            HttpLedgerClient::classify(StatusCode::OK, &body),
            ErrorClass::AlreadyExists
        );
        assert_eq!(
            HttpLedgerClient::classify(StatusCode::CONFLICT, &None),
            ErrorClass::AlreadyExists
        );
        assert_eq!(
            HttpLedgerClient::classify(StatusCode::BAD_REQUEST, &None),
            ErrorClass::Permanent
        );
        assert_eq!(
            HttpLedgerClient::classify(StatusCode::BAD_GATEWAY, &None),
            ErrorClass::Transient
        );
    }
}
