//! Snapshot queries over the REST endpoint.

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::{
    auth::AuthProvider,
    error::{QueryError, Result, SyncError},
    filter::FilterExpression,
    models::{Entity, ID_COLUMN},
    snapshot::QueryBackend,
};

/// Error code returned by the REST layer when a single-object read matched no row
const NO_ROWS_CODE: &str = "PGRST116";

/// Media type requesting a single JSON object instead of an array
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Status of a single-object read that did not match exactly one row
const NOT_ACCEPTABLE: u16 = 406;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Handles snapshot reads via HTTP.
#[derive(Clone)]
pub struct RestQueryBackend {
    base_url: String,
    http_client: reqwest::Client,
    auth: AuthProvider,
}

#[derive(Debug, Deserialize)]
struct RestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RestQueryBackend {
    pub fn new(base_url: impl Into<String>, auth: AuthProvider) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SyncError::ConfigurationError(e.to_string()))?;
        Ok(Self::with_client(base_url, http_client, auth))
    }

    /// Reuse an existing HTTP client (connection pool, proxies, TLS config)
    pub fn with_client(
        base_url: impl Into<String>,
        http_client: reqwest::Client,
        auth: AuthProvider,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            auth,
        }
    }

    pub(crate) fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    pub(crate) fn collection_params(filter: Option<&FilterExpression>) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        if let Some(filter) = filter {
            params.push((filter.column().to_string(), filter.condition()));
        }
        params
    }

    pub(crate) fn record_params(id: &str) -> Vec<(String, String)> {
        let filter = FilterExpression::id_eq(id);
        vec![
            ("select".to_string(), "*".to_string()),
            (ID_COLUMN.to_string(), filter.condition()),
        ]
    }

    async fn error_from_response(response: reqwest::Response) -> QueryError {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let error = classify_error(status, &text);
        if let QueryError::Server { message, .. } = &error {
            warn!(
                "[SYNC_HTTP] Server error: status={} message=\"{}\"",
                status, message
            );
        }
        error
    }
}

/// Map a failed response to a [`QueryError`].
///
/// A single-object read that matched no row answers `406` with code
/// `PGRST116`. Proxies sometimes strip the body, so a `406` without any
/// error code counts as no row as well.
pub(crate) fn classify_error(status: u16, body: &str) -> QueryError {
    let parsed = serde_json::from_str::<RestErrorBody>(body).ok();
    let code = parsed.as_ref().and_then(|b| b.code.as_deref());

    match code {
        Some(NO_ROWS_CODE) => return QueryError::NotFound,
        None if status == NOT_ACCEPTABLE => return QueryError::NotFound,
        _ => {}
    }

    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string());
    QueryError::Server {
        status_code: status,
        message,
    }
}

#[async_trait]
impl QueryBackend for RestQueryBackend {
    async fn select_all(
        &self,
        table: &str,
        filter: Option<&FilterExpression>,
    ) -> std::result::Result<Vec<Entity>, QueryError> {
        let url = self.table_url(table);
        let start = Instant::now();
        debug!("[SYNC_HTTP] GET {} filter={:?}", url, filter.map(ToString::to_string));

        let request = self
            .http_client
            .get(&url)
            .query(&Self::collection_params(filter));
        let response = self.auth.apply_to_request(request).send().await?;

        debug!(
            "[SYNC_HTTP] Response received: status={} duration_ms={}",
            response.status(),
            start.elapsed().as_millis()
        );

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response.json::<Vec<Entity>>().await?)
    }

    async fn select_by_id(&self, table: &str, id: &str) -> std::result::Result<Entity, QueryError> {
        let url = self.table_url(table);
        debug!("[SYNC_HTTP] GET {} id={}", url, id);

        let request = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .query(&Self::record_params(id));
        let response = self.auth.apply_to_request(request).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response.json::<Entity>().await?)
    }
}
