//! HTTP adapter for the structured index store (PostgREST-style REST API).
//!
//! Rows live in one table whose columns carry the row field names. Duplicate
//! lookups filter server-side on the day range only. Name, community and role
//! are compared after normalization, since other clients may have written
//! them with different accents or spacing.

use crate::remote::{IndexQuery, IndexStore, RemoteError, RemoteMatch};
use crate::shared::normalize::normalize_text;
use crate::shared::row::AttendanceRow;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

/// Default table name
pub const DEFAULT_TABLE: &str = "presencas";

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const NOT_NULL_VIOLATION: &str = "23502";

/// Index store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpIndexStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    table: String,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateRow {
    #[serde(rename = "UUID")]
    uuid: Uuid,
    #[serde(rename = "NOME_COMPLETO")]
    full_name: String,
    #[serde(rename = "COMUM")]
    community: String,
    #[serde(rename = "CARGO")]
    role: String,
    #[serde(rename = "DATA_HORA_UTC")]
    recorded_at: DateTime<Utc>,
}

/// Rows of the day range that match `query` after normalization
fn matching_rows(rows: Vec<CandidateRow>, query: &IndexQuery) -> Vec<RemoteMatch> {
    let name = normalize_text(&query.name);
    let community = normalize_text(&query.community);
    let role = normalize_text(&query.role);
    rows.into_iter()
        .filter(|row| {
            normalize_text(&row.full_name) == name
                && normalize_text(&row.community) == community
                && normalize_text(&row.role) == role
        })
        .map(|row| RemoteMatch {
            uuid: row.uuid,
            recorded_at: row.recorded_at,
        })
        .collect()
}

impl HttpIndexStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        table: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unknown(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            table: table.unwrap_or_else(|| DEFAULT_TABLE.to_string()),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }
}

/// Maps a non-success PostgREST response to the error taxonomy
pub(crate) fn classify_response(status: StatusCode, body: &str) -> RemoteError {
    let parsed = serde_json::from_str::<PostgrestError>(body).ok();
    let code = parsed.as_ref().and_then(|error| error.code.as_deref());
    let message = parsed
        .as_ref()
        .and_then(|error| error.message.clone())
        .unwrap_or_else(|| body.to_string());

    match (status, code) {
        (_, Some(UNIQUE_VIOLATION)) | (StatusCode::CONFLICT, None) => RemoteError::Duplicate,
        (_, Some(FOREIGN_KEY_VIOLATION | NOT_NULL_VIOLATION)) => RemoteError::Validation(message),
        (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, _) => RemoteError::Validation(message),
        (StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT, _) => RemoteError::Timeout,
        (StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE, _) => {
            RemoteError::Network(format!("{status}: {message}"))
        }
        _ => RemoteError::Unknown(format!("{status}: {message}")),
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl IndexStore for HttpIndexStore {
    async fn insert(&self, row: &AttendanceRow) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(self.table_url())
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(row);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RemoteError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_response(status, &body));
        }

        tracing::debug!(record_id = %row.uuid, store = "index", "Row inserted");
        Ok(())
    }

    async fn find_matches(&self, query: &IndexQuery) -> Result<Vec<RemoteMatch>, RemoteError> {
        let request = self.client.get(self.table_url()).query(&[
            ("select", "UUID,NOME_COMPLETO,COMUM,CARGO,DATA_HORA_UTC".to_string()),
            ("DATA_HORA_UTC", format!("gte.{}", rfc3339(query.from))),
            ("DATA_HORA_UTC", format!("lt.{}", rfc3339(query.to))),
        ]);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RemoteError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_response(status, &body));
        }

        let rows: Vec<CandidateRow> = response.json().await.map_err(|e| RemoteError::from_transport(&e))?;

        Ok(matching_rows(rows, query))
    }
}
