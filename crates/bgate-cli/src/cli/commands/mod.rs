//! CLI command handlers, one per file.

mod batch;
mod call;
mod season;
mod serve;
mod stream;

pub use batch::run_batch;
pub use call::run_call;
pub use season::{run_season, SeasonArgs};
pub use serve::run_serve;
pub use stream::run_stream;

use anyhow::{Context as _, Result};
use bgate_core::ProxyError;
use reqwest::Method;
use serde_json::Value;

pub(crate) fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method {method:?}"))
}

pub(crate) fn parse_body(body: Option<&str>) -> Result<Option<Value>> {
    body.map(|b| serde_json::from_str(b).context("--body is not valid JSON"))
        .transpose()
}

/// Print the public error envelope on stdout and turn the error into a failure exit.
pub(crate) fn report_error(err: ProxyError) -> anyhow::Error {
    if let Ok(text) = serde_json::to_string_pretty(&err.envelope()) {
        println!("{text}");
    }
    anyhow::Error::new(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_are_case_insensitive() {
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert_eq!(parse_method(" GET ").unwrap(), Method::GET);
        assert!(parse_method("BAD METHOD").is_err());
    }

    #[test]
    fn body_must_be_json() {
        assert!(parse_body(None).unwrap().is_none());
        assert_eq!(
            parse_body(Some(r#"{"force":true}"#)).unwrap(),
            Some(serde_json::json!({"force": true}))
        );
        assert!(parse_body(Some("{")).is_err());
    }
}
