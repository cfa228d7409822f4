//! # PostgREST Store
//!
//! [`DataStore`] over a Supabase / PostgREST endpoint. Each primitive maps to
//! one HTTP request against `{base_url}/rest/v1/{table}`:
//!
//! ```text
//! get     GET    ?select=*&col=op.value&order=col.desc&limit=n
//! insert  POST   body = record          Prefer: return=representation
//! update  PATCH  ?col=op.value, body    Prefer: return=representation
//! delete  DELETE ?col=op.value          Prefer: return=representation
//! ```
//!
//! Update and delete always ask for the affected rows back so the row count
//! is exact; compare-and-set in the engine depends on it.
//!
//! ## Status Mapping
//! - transport error, 408, 429, 5xx → `Unavailable` (retried)
//! - other 4xx → `Rejected`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::filter::{Filter, FilterOp, SortOrder};
use crate::record::Record;
use crate::store::DataStore;
use crate::table::Table;

/// Connection settings for a PostgREST backend.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`.
    pub base_url: String,

    /// Sent as both `apikey` and the bearer token.
    pub api_key: String,

    /// Per-request HTTP timeout.
    pub timeout: Duration,

    /// Ask PostgREST to echo inserted rows. When off, `insert` returns
    /// `None` and callers recover ids by lookup.
    pub return_representation: bool,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        RestConfig {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
            return_representation: true,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn return_representation(mut self, enabled: bool) -> Self {
        self.return_representation = enabled;
        self
    }
}

/// PostgREST-backed [`DataStore`].
#[derive(Debug, Clone)]
pub struct RestStore {
    config: RestConfig,
    client: Client,
}

impl RestStore {
    pub fn new(config: RestConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(RestStore { config, client })
    }

    fn url(&self, table: Table) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table.name()
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    /// Sends the request and maps non-success statuses.
    async fn send(&self, table: Table, request: RequestBuilder) -> StoreResult<Response> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(table = %table, status = %status, body = %body, "PostgREST request failed");
        if is_transient_status(status) {
            Err(StoreError::Unavailable(format!("HTTP {}: {}", status, body)))
        } else {
            Err(StoreError::Rejected(format!("HTTP {}: {}", status, body)))
        }
    }

    async fn rows(response: Response) -> StoreResult<Vec<Record>> {
        let body: Value = response.json().await?;
        match body {
            Value::Array(items) => items.into_iter().map(Record::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![Record::from_value(other)?]),
        }
    }
}

#[async_trait]
impl DataStore for RestStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn get(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        filter.validate_for(table)?;
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query_params(filter));
        debug!(table = %table, ?params, "rest get");

        let request = self.client.get(self.url(table)).query(&params);
        let response = self.send(table, request).await?;
        RestStore::rows(response).await
    }

    async fn insert(&self, table: Table, record: &Record) -> StoreResult<Option<Record>> {
        table.check_record(record)?;
        let prefer = if self.config.return_representation {
            "return=representation"
        } else {
            "return=minimal"
        };

        let request = self
            .client
            .post(self.url(table))
            .header("Prefer", prefer)
            .json(record);
        let response = self.send(table, request).await?;

        if !self.config.return_representation {
            return Ok(None);
        }
        Ok(RestStore::rows(response).await?.into_iter().next())
    }

    async fn update(&self, table: Table, filter: &Filter, patch: &Record) -> StoreResult<u64> {
        filter.require_conditions(table, "update")?;
        filter.validate_for(table)?;
        table.check_record(patch)?;

        let request = self
            .client
            .patch(self.url(table))
            .query(&query_params(filter))
            .header("Prefer", "return=representation")
            .json(patch);
        let response = self.send(table, request).await?;
        Ok(RestStore::rows(response).await?.len() as u64)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        filter.require_conditions(table, "delete")?;
        filter.validate_for(table)?;

        let request = self
            .client
            .delete(self.url(table))
            .query(&query_params(filter))
            .header("Prefer", "return=representation");
        let response = self.send(table, request).await?;
        Ok(RestStore::rows(response).await?.len() as u64)
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Renders a filter as PostgREST query parameters.
pub fn query_params(filter: &Filter) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(filter.conditions().len() + 2);
    for condition in filter.conditions() {
        let rendered = match (&condition.value, condition.op) {
            (Value::Null, FilterOp::Neq) => "not.is.null".to_string(),
            (Value::Null, _) => "is.null".to_string(),
            (value, op) => format!("{}.{}", op.postgrest(), scalar_text(value)),
        };
        params.push((condition.column.clone(), rendered));
    }
    if let Some((column, order)) = filter.ordering() {
        let direction = match order {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        };
        params.push(("order".to_string(), format!("{}.{}", column, direction)));
    }
    if let Some(limit) = filter.max_rows() {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn test_query_params_for_report_filter() {
        let filter = Filter::eq("payment_method", "cash")
            .and("sale_date", FilterOp::Gte, "2026-10-15T00:00:00.000000Z")
            .order_by("sale_date", SortOrder::Desc)
            .limit(100);

        assert_eq!(
            pairs(&query_params(&filter)),
            vec![
                ("payment_method", "eq.cash"),
                ("sale_date", "gte.2026-10-15T00:00:00.000000Z"),
                ("order", "sale_date.desc"),
                ("limit", "100"),
            ]
        );
    }

    #[test]
    fn test_query_params_for_compare_and_set() {
        let filter = Filter::eq("id", 1).and_eq("is_open", true);
        assert_eq!(
            pairs(&query_params(&filter)),
            vec![("id", "eq.1"), ("is_open", "eq.true")]
        );
    }

    #[test]
    fn test_query_params_null() {
        let filter = Filter::eq("closing_time", Value::Null).and(
            "opening_time",
            FilterOp::Neq,
            Value::Null,
        );
        assert_eq!(
            pairs(&query_params(&filter)),
            vec![("closing_time", "is.null"), ("opening_time", "not.is.null")]
        );
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::CONFLICT));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let store = RestStore::new(RestConfig::new("https://kasa.supabase.co/", "key")).unwrap();
        assert_eq!(
            store.url(Table::SaleItems),
            "https://kasa.supabase.co/rest/v1/sale_items"
        );
    }
}
