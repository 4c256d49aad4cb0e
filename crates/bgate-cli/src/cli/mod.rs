//! CLI for the bgate backend gateway.

mod commands;

use anyhow::{Context as _, Result};
use bgate_core::backend::{Backend, ServiceCredential};
use bgate_core::config::{self, GatewayConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_batch, run_call, run_season, run_serve, run_stream};

/// Top-level CLI for the backend gateway.
#[derive(Debug, Parser)]
#[command(name = "bgate")]
#[command(about = "bgate: resilient gateway to the admin backend", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/bgate/config.toml, created if missing).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Call a backend JSON endpoint with retries and print the response.
    Call {
        /// Backend path, e.g. /admin/shows/123.
        path: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
        /// Extra attempts after the first (default from config).
        #[arg(long)]
        retries: Option<u32>,
        /// Per-attempt timeout in milliseconds (default from config).
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },

    /// Call a season-scoped endpoint, resolving the season id first.
    Season {
        show_id: String,
        season_number: String,
        /// Path under the season, e.g. /analytics.
        path: String,
        /// Known season id; skips the lookup when it is a valid UUID.
        #[arg(long)]
        season_id: Option<String>,
        /// Query string forwarded to the backend (without the leading '?').
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Relay a streaming backend operation to stdout as SSE.
    Stream {
        path: String,
        #[arg(long)]
        body: Option<String>,
        /// Request id forwarded to the backend as x-request-id.
        #[arg(long)]
        request_id: Option<String>,
    },

    /// POST to many backend paths with bounded concurrency; failures don't stop the batch.
    Batch {
        #[arg(required = true)]
        paths: Vec<String>,
        #[arg(long)]
        body: Option<String>,
        /// Calls in flight at once (default from config).
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Serve the gateway over HTTP.
    Serve {
        /// Listen address (default from config).
        #[arg(long)]
        listen: Option<String>,
    },
}

impl CliCommand {
    pub fn logs_to_stderr(&self) -> bool {
        matches!(self, CliCommand::Serve { .. })
    }
}

/// Loaded config plus what every command needs to reach the backend.
pub struct Context {
    pub cfg: GatewayConfig,
    pub backend: Backend,
    pub credential: ServiceCredential,
    pub client: reqwest::Client,
}

impl Context {
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let cfg = match path {
            Some(p) => config::load_from(p)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);
        let backend = cfg.backend()?;
        let credential = ServiceCredential::from_env(&cfg.service_token_env)?;
        let client = reqwest::Client::builder()
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            cfg,
            backend,
            credential,
            client,
        })
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    pub async fn run(self) -> Result<()> {
        let ctx = Context::load(self.config.as_deref())?;

        match self.command {
            CliCommand::Call {
                path,
                method,
                body,
                retries,
                timeout_ms,
            } => run_call(&ctx, &path, &method, body.as_deref(), retries, timeout_ms).await?,
            CliCommand::Season {
                show_id,
                season_number,
                path,
                season_id,
                query,
                method,
                body,
                retries,
            } => {
                run_season(
                    &ctx,
                    commands::SeasonArgs {
                        show_id,
                        season_number,
                        path,
                        season_id,
                        query,
                        method,
                        body,
                        retries,
                    },
                )
                .await?
            }
            CliCommand::Stream {
                path,
                body,
                request_id,
            } => run_stream(&ctx, &path, body.as_deref(), request_id).await?,
            CliCommand::Batch {
                paths,
                body,
                concurrency,
                retries,
            } => run_batch(&ctx, paths, body.as_deref(), concurrency, retries).await?,
            CliCommand::Serve { listen } => run_serve(ctx, listen).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
