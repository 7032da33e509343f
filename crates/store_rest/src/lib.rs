//! REST implementation of the remote store boundary.
//!
//! Talks to `/collections/{name}/documents` and classifies failures
//! structurally: transport errors from the HTTP client become
//! connectivity kinds, response statuses become the remaining
//! `StoreError` variants. Message text is never inspected.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use shared::{
    domain::{Document, EntityId, FilterOp, FilterPredicate, RemoteRecord},
    error::StoreError,
};
use sync_core::RemoteStoreAdapter;
use tracing::debug;

mod config;
pub use config::{load_settings, RestSettings};

pub struct RestStore {
    http: Client,
    base_url: String,
    collection: String,
}

impl RestStore {
    pub fn new(settings: &RestSettings, collection: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            collection: collection.into(),
        })
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/collections/{}/documents",
            self.base_url, self.collection
        )
    }

    fn document_url(&self, id: &EntityId) -> String {
        format!("{}/{}", self.documents_url(), id)
    }
}

#[derive(Debug, Deserialize)]
struct DocumentPayload {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    fields: Document,
}

impl From<DocumentPayload> for RemoteRecord {
    fn from(payload: DocumentPayload) -> Self {
        Self {
            id: EntityId(payload.id),
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            fields: payload.fields,
        }
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::timeout()
    } else if err.is_connect() || err.is_request() || err.is_body() {
        // Covers both refused connections and connections lost
        // mid-request or mid-body; decode errors stay uncategorized.
        StoreError::unreachable()
    } else {
        StoreError::Unknown(err.into())
    }
}

async fn error_from_response(response: reqwest::Response, id: Option<&EntityId>) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => match id {
            Some(id) => StoreError::NotFound(id.clone()),
            None => StoreError::Unknown(anyhow!("collection endpoint not found: {body}")),
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Validation(body),
        _ => StoreError::Unknown(anyhow!("unexpected status {status}: {body}")),
    }
}

fn filter_query(filter: &[FilterPredicate]) -> Vec<(String, String)> {
    filter
        .iter()
        .map(|predicate| match predicate.op {
            FilterOp::Eq => {
                let value = match &predicate.value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (predicate.field.clone(), value)
            }
        })
        .collect()
}

#[async_trait]
impl RemoteStoreAdapter for RestStore {
    async fn get_all(&self, filter: &[FilterPredicate]) -> Result<Vec<RemoteRecord>, StoreError> {
        debug!(collection = %self.collection, "rest: fetching collection");
        let response = self
            .http
            .get(self.documents_url())
            .query(&filter_query(filter))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response, None).await);
        }
        let payloads: Vec<DocumentPayload> = response.json().await.map_err(transport_error)?;
        Ok(payloads.into_iter().map(RemoteRecord::from).collect())
    }

    async fn add(&self, fields: &Document) -> Result<RemoteRecord, StoreError> {
        let response = self
            .http
            .post(self.documents_url())
            .json(fields)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response, None).await);
        }
        let payload: DocumentPayload = response.json().await.map_err(transport_error)?;
        Ok(payload.into())
    }

    async fn update(&self, id: &EntityId, partial: &Document) -> Result<(), StoreError> {
        let response = self
            .http
            .patch(self.document_url(id))
            .json(partial)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response, Some(id)).await);
        }
        Ok(())
    }

    async fn remove(&self, id: &EntityId) -> Result<(), StoreError> {
        let response = self
            .http
            .delete(self.document_url(id))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response, Some(id)).await);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
