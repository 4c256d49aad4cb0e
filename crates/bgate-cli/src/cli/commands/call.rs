//! `bgate call`: one retrying JSON call.

use std::time::Duration;

use anyhow::Result;
use bgate_core::gateway::{CallOptions, JsonGateway};

use super::{parse_body, parse_method, report_error};
use crate::cli::Context;

pub async fn run_call(
    ctx: &Context,
    path: &str,
    method: &str,
    body: Option<&str>,
    retries: Option<u32>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let gateway = JsonGateway::new(
        ctx.client.clone(),
        Some(ctx.credential.clone()),
        ctx.cfg.gateway.policy(),
    );
    let mut opts = CallOptions::new("Backend request failed")
        .method(parse_method(method)?)
        .retries(retries.unwrap_or(ctx.cfg.gateway.default_retries));
    if let Some(body) = parse_body(body)? {
        opts = opts.body(body);
    }
    if let Some(ms) = timeout_ms {
        opts = opts.timeout(Duration::from_millis(ms));
    }

    let url = ctx.backend.url(path);
    let response = gateway
        .call_with_report(&url, &opts)
        .await
        .map_err(report_error)?;
    tracing::info!(
        attempts = response.attempts,
        trace_id = %response.trace_id,
        "call to {} succeeded",
        url
    );
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    Ok(())
}
