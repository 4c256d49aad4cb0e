//! `bgate serve`: run the HTTP gateway.

use anyhow::Result;
use bgate_core::server;

use crate::cli::Context;

pub async fn run_serve(ctx: Context, listen: Option<String>) -> Result<()> {
    let mut cfg = ctx.cfg;
    if let Some(listen) = listen {
        cfg.listen = listen;
    }
    server::serve(&cfg, Some(ctx.credential)).await
}
