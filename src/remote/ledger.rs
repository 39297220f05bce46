//! HTTP adapter for the append-only ledger.
//!
//! The ledger endpoint accepts one JSON row per POST. Some deployments
//! answer `200` with `{"success": false, "error": ...}` instead of an error
//! status, so the body is inspected as well.

use crate::remote::{LedgerStore, RemoteError};
use crate::shared::row::AttendanceRow;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Ledger reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpLedgerStore {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct LedgerReply {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

impl HttpLedgerStore {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unknown(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// Maps a non-success ledger status to the error taxonomy
pub(crate) fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => RemoteError::Validation(body.to_string()),
        StatusCode::CONFLICT => RemoteError::Duplicate,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RemoteError::Timeout,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            RemoteError::Network(format!("{status}: {body}"))
        }
        _ => RemoteError::Unknown(format!("{status}: {body}")),
    }
}

#[async_trait]
impl LedgerStore for HttpLedgerStore {
    async fn append(&self, row: &AttendanceRow) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(row)
            .send()
            .await
            .map_err(|e| RemoteError::from_transport(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RemoteError::from_transport(&e))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        if let Ok(reply) = serde_json::from_str::<LedgerReply>(&body) {
            if !reply.success {
                return Err(RemoteError::Unknown(
                    reply.error.unwrap_or_else(|| "ledger reported failure".to_string()),
                ));
            }
        }

        tracing::debug!(record_id = %row.uuid, store = "ledger", "Row appended");
        Ok(())
    }
}
