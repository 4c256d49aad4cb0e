use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::backend::{Backend, ServiceCredential};
use crate::error::{classify_transport, upstream_error, ProxyError, UpstreamBody};

/// Storage seam for season lookups by (show, season number).
#[async_trait]
pub trait SeasonLookup: Send + Sync {
    /// `Ok(None)` when the show has no such season.
    async fn season_id(&self, show_id: &str, season_number: i32)
        -> Result<Option<String>, ProxyError>;
}

#[async_trait]
impl<T: SeasonLookup + ?Sized> SeasonLookup for std::sync::Arc<T> {
    async fn season_id(
        &self,
        show_id: &str,
        season_number: i32,
    ) -> Result<Option<String>, ProxyError> {
        (**self).season_id(show_id, season_number).await
    }
}

#[derive(Debug, Deserialize)]
struct SeasonRecord {
    id: Option<String>,
}

/// Looks seasons up through the backend: `GET /shows/<show>/seasons/<n>` → `{id}`.
/// Single attempt; a 404 means the season does not exist.
#[derive(Debug, Clone)]
pub struct HttpSeasonLookup {
    client: reqwest::Client,
    backend: Backend,
    credential: Option<ServiceCredential>,
}

impl HttpSeasonLookup {
    pub fn new(
        client: reqwest::Client,
        backend: Backend,
        credential: Option<ServiceCredential>,
    ) -> Self {
        Self {
            client,
            backend,
            credential,
        }
    }
}

#[async_trait]
impl SeasonLookup for HttpSeasonLookup {
    async fn season_id(
        &self,
        show_id: &str,
        season_number: i32,
    ) -> Result<Option<String>, ProxyError> {
        let url = self
            .backend
            .url(&format!("/shows/{show_id}/seasons/{season_number}"));
        let mut req = self.client.get(&url);
        if let Some(cred) = &self.credential {
            req = cred.apply(req);
        }
        let response = req.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = response.bytes().await.map_err(|e| classify_transport(&e))?;
        if !status.is_success() {
            return Err(upstream_error(
                status.as_u16(),
                UpstreamBody::from_bytes(&bytes, "Failed to look up season"),
            ));
        }
        let record: SeasonRecord = serde_json::from_slice(&bytes)
            .map_err(|e| ProxyError::internal(format!("invalid season record: {e}")))?;
        Ok(record.id.filter(|id| !id.is_empty()))
    }
}
