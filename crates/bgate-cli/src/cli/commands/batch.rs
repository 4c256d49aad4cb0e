//! `bgate batch`: POST to many paths with a concurrency ceiling.

use anyhow::Result;
use bgate_core::batch::run_collect;
use bgate_core::gateway::{CallOptions, JsonGateway};
use reqwest::Method;

use super::parse_body;
use crate::cli::Context;

pub async fn run_batch(
    ctx: &Context,
    paths: Vec<String>,
    body: Option<&str>,
    concurrency: Option<usize>,
    retries: Option<u32>,
) -> Result<()> {
    let gateway = JsonGateway::new(
        ctx.client.clone(),
        Some(ctx.credential.clone()),
        ctx.cfg.gateway.policy(),
    );
    let mut opts = CallOptions::new("Batch item failed")
        .method(Method::POST)
        .retries(retries.unwrap_or(ctx.cfg.gateway.default_retries));
    if let Some(body) = parse_body(body)? {
        opts = opts.body(body);
    }
    let concurrency = concurrency.unwrap_or(ctx.cfg.batch.concurrency);
    tracing::info!(items = paths.len(), concurrency, "starting batch");

    let (gateway, opts) = (&gateway, &opts);
    let results = run_collect(paths.clone(), concurrency, |path| async move {
        gateway.call_with_report(&ctx.backend.url(&path), opts).await
    })
    .await;

    let mut failed = 0usize;
    for (path, result) in paths.iter().zip(&results) {
        match result {
            Ok(r) => println!("ok   {path} (attempts: {})", r.attempts),
            Err(e) => {
                failed += 1;
                println!(
                    "fail {path} {} {}{}",
                    e.code,
                    e,
                    if e.retryable { " (retryable)" } else { "" }
                );
            }
        }
    }
    println!("{} succeeded, {} failed", results.len() - failed, failed);
    if failed > 0 {
        anyhow::bail!("{failed} of {} batch items failed", results.len());
    }
    Ok(())
}
