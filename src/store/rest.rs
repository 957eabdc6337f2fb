//! PostgREST-style HTTP implementation of [`RowStore`].
//!
//! Speaks the Supabase REST dialect: `GET/POST/PATCH/DELETE /rest/v1/{table}`
//! with `column=eq.value` filter operators, `apikey` + bearer headers, and
//! `Prefer: return=representation` so writes report the affected rows.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Condition, Filter, Order, RowStore, SelectQuery, StoreError};
use crate::config::StoreConfig;

const REST_ROOT: &str = "rest/v1/";

#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    rest_root: Url,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| StoreError::Transport(format!("invalid api key header: {}", e)))?;
        headers.insert("apikey", key);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| StoreError::Transport(format!("invalid api key header: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let base = Url::parse(&config.base_url)
            .map_err(|e| StoreError::Transport(format!("invalid store url: {}", e)))?;
        let rest_root = base
            .join(REST_ROOT)
            .map_err(|e| StoreError::Transport(format!("invalid store url: {}", e)))?;

        Ok(Self { client, rest_root })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.rest_root
            .join(table)
            .map_err(|e| StoreError::Transport(format!("invalid table name '{}': {}", table, e)))
    }

    async fn send(
        &self,
        method: Method,
        table: &str,
        url: Url,
        body: Option<&Value>,
        want_rows: bool,
    ) -> Result<Vec<Value>, StoreError> {
        let mut request = self.client.request(method, url);
        if want_rows {
            request = request.header("Prefer", "return=representation");
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(StoreError::Rejected {
                table: table.to_string(),
                status: status.as_u16(),
                message: rejection_message(status, &text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Array(rows) => Ok(rows),
            single => Ok(vec![single]),
        }
    }
}

#[async_trait]
impl RowStore for RestStore {
    async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>, StoreError> {
        let mut url = self.table_url(table)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            append_filter(&mut pairs, &query.filter);
            if !query.order.is_empty() {
                pairs.append_pair("order", &order_param(&query.order));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        debug!(table, url = %url, "select");
        self.send(Method::GET, table, url, None, false).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let url = self.table_url(table)?;
        debug!(table, "insert");
        let rows = self.send(Method::POST, table, url, Some(&row), true).await?;
        rows.into_iter().next().ok_or_else(|| {
            StoreError::Decode(format!("insert into '{}' returned no representation", table))
        })
    }

    async fn update(&self, table: &str, filter: Filter, patch: Value) -> Result<u64, StoreError> {
        guard_filtered(table, &filter)?;
        let mut url = self.table_url(table)?;
        append_filter(&mut url.query_pairs_mut(), &filter);
        debug!(table, url = %url, "update");
        let rows = self
            .send(Method::PATCH, table, url, Some(&patch), true)
            .await?;
        Ok(rows.len() as u64)
    }

    async fn delete(&self, table: &str, filter: Filter) -> Result<u64, StoreError> {
        guard_filtered(table, &filter)?;
        let mut url = self.table_url(table)?;
        append_filter(&mut url.query_pairs_mut(), &filter);
        debug!(table, url = %url, "delete");
        let rows = self.send(Method::DELETE, table, url, None, true).await?;
        Ok(rows.len() as u64)
    }
}

/// Unfiltered update/delete would rewrite a whole table; in this system that
/// is always a caller bug, so it never reaches the wire.
fn guard_filtered(table: &str, filter: &Filter) -> Result<(), StoreError> {
    if filter.is_empty() {
        return Err(StoreError::Rejected {
            table: table.to_string(),
            status: 400,
            message: "refusing unfiltered write".to_string(),
        });
    }
    Ok(())
}

fn append_filter(pairs: &mut url::form_urlencoded::Serializer<'_, url::UrlQuery<'_>>, filter: &Filter) {
    for condition in filter.conditions() {
        match condition {
            Condition::Eq(column, value) => {
                pairs.append_pair(column, &format!("eq.{}", literal(value)));
            }
            Condition::IsNull(column) => {
                pairs.append_pair(column, "is.null");
            }
        }
    }
}

fn order_param(order: &[Order]) -> String {
    order
        .iter()
        .map(|o| {
            if o.descending {
                format!("{}.desc", o.column)
            } else {
                format!("{}.asc", o.column)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders a JSON value as a PostgREST filter literal (strings unquoted).
fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// PostgREST error bodies are JSON with a `message` field; fall back to the
/// raw body or the status reason.
fn rejection_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(Value::String(message)) = map.get("message") {
            return message.clone();
        }
    }
    if !body.trim().is_empty() {
        return body.trim().to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literal_renders_strings_unquoted() {
        assert_eq!(literal(&json!("Tornillos")), "Tornillos");
        assert_eq!(literal(&json!(42)), "42");
        assert_eq!(literal(&json!(false)), "false");
    }

    #[test]
    fn order_param_joins_keys() {
        let param = order_param(&[Order::desc("production_date"), Order::desc("created_at")]);
        assert_eq!(param, "production_date.desc,created_at.desc");
    }

    #[test]
    fn rejection_message_prefers_store_message() {
        let msg = rejection_message(
            StatusCode::CONFLICT,
            r#"{"message":"duplicate key value","code":"23505"}"#,
        );
        assert_eq!(msg, "duplicate key value");
        assert_eq!(rejection_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }
}
