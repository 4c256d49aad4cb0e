//! Inbound HTTP surface for `bgate serve`.
//!
//! Callers reaching these routes are assumed to be authenticated already.
//!
//! - `ANY  /api/json/*path`: retrying JSON call to `<backend>/<path>`
//! - `ANY  /api/seasons/:show_id/:season_number/*path`: season-scoped JSON call
//! - `POST /api/stream/*path`: SSE relay of `<backend>/<path>`

mod handlers;
mod response;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{any, post};
use axum::Router;

use crate::backend::{Backend, ServiceCredential};
use crate::config::GatewayConfig;
use crate::error::{ProxyError, MISSING_CREDENTIAL_MESSAGE};
use crate::gateway::JsonGateway;
use crate::season::{HttpSeasonLookup, SeasonGateway};
use crate::stream::StreamRelay;

/// Header a caller may set to override the configured retry count for one JSON call.
pub const RETRIES_HEADER: &str = "x-gateway-retries";

pub struct AppState {
    pub backend: Backend,
    pub gateway: JsonGateway,
    pub seasons: SeasonGateway<HttpSeasonLookup>,
    pub relay: StreamRelay,
    pub default_retries: u32,
    has_credential: bool,
}

impl AppState {
    pub fn from_config(cfg: &GatewayConfig, credential: Option<ServiceCredential>) -> Result<Self> {
        let backend = cfg.backend()?;
        let has_credential = credential.is_some();
        let client = reqwest::Client::builder()
            .build()
            .context("building HTTP client")?;
        let gateway = JsonGateway::new(client.clone(), credential.clone(), cfg.gateway.policy());
        let lookup = HttpSeasonLookup::new(client.clone(), backend.clone(), credential.clone());
        let relay = StreamRelay::new(client, credential, cfg.stream.relay_settings(&backend));
        Ok(Self {
            seasons: SeasonGateway::new(backend.clone(), gateway.clone(), lookup),
            backend,
            gateway,
            relay,
            default_retries: cfg.gateway.default_retries,
            has_credential,
        })
    }

    /// Routes refuse to call the backend without a service credential.
    pub fn require_credential(&self) -> Result<(), ProxyError> {
        if self.has_credential {
            Ok(())
        } else {
            Err(ProxyError::from_message(MISSING_CREDENTIAL_MESSAGE))
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/json/*path", any(handlers::json_proxy))
        .route(
            "/api/seasons/:show_id/:season_number/*path",
            any(handlers::season_proxy),
        )
        .route("/api/stream/*path", post(handlers::stream_proxy))
        .with_state(state)
}

/// Bind `cfg.listen` and serve until the process is stopped.
pub async fn serve(cfg: &GatewayConfig, credential: Option<ServiceCredential>) -> Result<()> {
    if credential.is_none() {
        tracing::warn!(
            env = %cfg.service_token_env,
            "no service credential; every route will answer 500"
        );
    }
    let state = Arc::new(AppState::from_config(cfg, credential)?);
    let listener = tokio::net::TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;
    tracing::info!(listen = %cfg.listen, backend = %cfg.backend_url, "gateway listening");
    axum::serve(listener, router(state))
        .await
        .context("server loop")?;
    Ok(())
}
