//! PostgREST-compatible HTTP store
//!
//! Speaks the PostgREST dialect used by Supabase-style backends:
//! - insert: `POST /{table}` with a JSON array body
//! - update: `PATCH /{table}?id=eq.{id}`
//! - delete: `DELETE /{table}?id=in.({ids})`
//!
//! `Prefer: return=representation` makes inserts and updates echo the
//! persisted rows, which is what the graph needs to learn durable ids.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;

use super::{Driver, StoreResponse, TableActions};
use crate::record::{Record, id_key};
use crate::schema::TableDescriptor;

/// HTTP client for a PostgREST endpoint
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PostgrestStore {
    /// Create a store for `base_url` (e.g. `https://xyz.supabase.co/rest/v1`)
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("PostgREST base URL cannot be empty");
        }
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, self.table_url(table))
            .header("Prefer", "return=representation");
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }
        request
    }
}

impl Driver for PostgrestStore {
    fn actions_for(&self, table: &TableDescriptor) -> Arc<dyn TableActions> {
        Arc::new(PostgrestTable {
            store: self.clone(),
            table: table.name.clone(),
        })
    }
}

/// Filter value for `id=eq.{id}`
fn eq_filter(id: &Value) -> String {
    format!("eq.{}", id_key(id))
}

/// Filter value for `id=in.(a,b,c)`
fn in_filter(ids: &[Value]) -> String {
    let joined: Vec<String> = ids.iter().map(id_key).collect();
    format!("in.({})", joined.join(","))
}

/// Turn an HTTP response into a store response.
///
/// Non-success statuses are not transport errors: they become failed
/// responses carrying the body, so the graph records them per row.
async fn into_store_response(response: Response) -> Result<StoreResponse> {
    let status = response.status();
    if status.is_success() {
        let data: Vec<Record> = response
            .json()
            .await
            .context("Failed to parse PostgREST response body")?;
        Ok(StoreResponse {
            data,
            error: None,
            status_code: Some(status.as_u16()),
        })
    } else {
        let body = response.text().await.unwrap_or_default();
        warn!("PostgREST request failed with status {}: {}", status, body);
        Ok(StoreResponse::error(body, Some(status.as_u16())))
    }
}

/// One table behind a [`PostgrestStore`]
#[derive(Debug, Clone)]
struct PostgrestTable {
    store: PostgrestStore,
    table: String,
}

#[async_trait]
impl TableActions for PostgrestTable {
    async fn insert(&self, rows: Vec<Record>) -> Result<StoreResponse> {
        debug!("POST {} ({} rows)", self.store.table_url(&self.table), rows.len());
        let response = self
            .store
            .request(Method::POST, &self.table)
            .json(&rows)
            .send()
            .await
            .with_context(|| format!("Failed to insert into {}", self.table))?;
        into_store_response(response).await
    }

    async fn update(&self, row: Record, id: &Value) -> Result<StoreResponse> {
        debug!("PATCH {} id={}", self.store.table_url(&self.table), id_key(id));
        let response = self
            .store
            .request(Method::PATCH, &self.table)
            .query(&[("id", eq_filter(id))])
            .json(&row)
            .send()
            .await
            .with_context(|| format!("Failed to update {} row {}", self.table, id_key(id)))?;
        into_store_response(response).await
    }

    async fn delete(&self, ids: Vec<Value>) -> Result<bool> {
        debug!("DELETE {} ({} ids)", self.store.table_url(&self.table), ids.len());
        let response = self
            .store
            .request(Method::DELETE, &self.table)
            .query(&[("id", in_filter(&ids))])
            .send()
            .await
            .with_context(|| format!("Failed to delete from {}", self.table))?;
        let status = response.status();
        if !status.is_success() {
            warn!("PostgREST delete on {} failed with status {}", self.table, status);
        }
        Ok(status.is_success())
    }
}
