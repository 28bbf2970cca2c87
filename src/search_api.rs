// Access to the remote inventory search endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::CatalogError;
use crate::models::FilterSet;

/// `search(filters, limit, cursor) -> RawPage`. The raw page is returned
/// untouched; the page mapper decides what to trust.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, filters: &FilterSet, limit: u32, cursor: u32) -> Result<Value, CatalogError>;
}

// Shared HTTP client for the backend. Proxies come from HTTP(S)_PROXY.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("autocatalog_rust/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("Failed to build reqwest client")
}

pub struct HttpSearchBackend {
    client: Client,
    url: String,
}

impl HttpSearchBackend {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(&self, filters: &FilterSet, limit: u32, cursor: u32) -> Result<Value, CatalogError> {
        let payload = search_payload(filters, limit, cursor);
        tracing::debug!(cursor, limit, payload = %payload, "Search request payload");

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?;

        let page: Value = response.json().await?;
        Ok(page)
    }
}

/// Request body for one backend page. Unset ranges are sent as null so the
/// backend applies its own bounds.
pub fn search_payload(filters: &FilterSet, limit: u32, cursor: u32) -> Value {
    json!({
        "marca": filters.marca,
        "modelo": filters.modelo,
        "caja": filters.caja.iter().map(|c| c.label()).collect::<Vec<_>>(),
        "combustible": filters.combustible.iter().map(|f| f.label()).collect::<Vec<_>>(),
        "anioMin": filters.anio.map(|r| r.min),
        "anioMax": filters.anio.map(|r| r.max),
        "precioMin": filters.precio.map(|r| r.min),
        "precioMax": filters.precio.map(|r| r.max),
        "kmMin": filters.km.map(|r| r.min),
        "kmMax": filters.km.map(|r| r.max),
        "limit": limit,
        "page": cursor,
    })
}

/// Runs one search bounded by `timeout`. An elapsed deadline surfaces as
/// `CatalogError::Timeout`, never as a hang.
pub async fn search_with_timeout<B>(
    backend: &B,
    filters: &FilterSet,
    limit: u32,
    cursor: u32,
    timeout: Duration,
) -> Result<Value, CatalogError>
where
    B: SearchBackend + ?Sized,
{
    match tokio::time::timeout(timeout, backend.search(filters, limit, cursor)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(cursor, ?timeout, "Search request timed out");
            Err(CatalogError::Timeout(timeout))
        }
    }
}
