//! `bgate season`: season-scoped JSON call.

use anyhow::Result;
use bgate_core::gateway::{CallOptions, JsonGateway};
use bgate_core::season::{HttpSeasonLookup, SeasonCall, SeasonGateway};

use super::{parse_body, parse_method, report_error};
use crate::cli::Context;

pub struct SeasonArgs {
    pub show_id: String,
    pub season_number: String,
    pub path: String,
    pub season_id: Option<String>,
    pub query: Option<String>,
    pub method: String,
    pub body: Option<String>,
    pub retries: Option<u32>,
}

pub async fn run_season(ctx: &Context, args: SeasonArgs) -> Result<()> {
    let credential = Some(ctx.credential.clone());
    let gateway = JsonGateway::new(ctx.client.clone(), credential.clone(), ctx.cfg.gateway.policy());
    let lookup = HttpSeasonLookup::new(ctx.client.clone(), ctx.backend.clone(), credential);
    let seasons = SeasonGateway::new(ctx.backend.clone(), gateway, lookup);

    let mut opts = CallOptions::new("Season backend request failed")
        .method(parse_method(&args.method)?)
        .retries(args.retries.unwrap_or(ctx.cfg.gateway.default_retries));
    if let Some(body) = parse_body(args.body.as_deref())? {
        opts = opts.body(body);
    }
    let mut call = SeasonCall::new(opts);
    call.query = args.query;
    call.season_id_hint = args.season_id;

    let value = seasons
        .fetch_json(&args.show_id, &args.season_number, &args.path, &call)
        .await
        .map_err(report_error)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
