//! `bgate stream`: relay a streaming operation to stdout.

use anyhow::Result;
use bgate_core::stream::{RelayOutcome, RelayRequest, StreamRelay};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::parse_body;
use crate::cli::Context;

pub async fn run_stream(
    ctx: &Context,
    path: &str,
    body: Option<&str>,
    request_id: Option<String>,
) -> Result<()> {
    let relay = StreamRelay::new(
        ctx.client.clone(),
        Some(ctx.credential.clone()),
        ctx.cfg.stream.relay_settings(&ctx.backend),
    );
    let mut request = RelayRequest::post(ctx.backend.url(path));
    request.body = parse_body(body)?;
    request.request_id = request_id;

    let mut handle = relay.open(request);
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = handle.body.next().await {
        stdout.write_all(&chunk).await?;
        stdout.flush().await?;
    }
    // Dropping the body first lets the session observe a closed stream if stdout failed.
    drop(handle.body);
    let report = handle.report.await?;
    tracing::info!(
        attempts = report.attempts_used,
        bytes = report.bytes_relayed,
        outcome = ?report.outcome,
        "stream finished"
    );
    match report.outcome {
        RelayOutcome::Completed => Ok(()),
        other => anyhow::bail!(
            "stream ended with {:?}: {}",
            other,
            report.last_error.as_deref().unwrap_or("no detail")
        ),
    }
}
