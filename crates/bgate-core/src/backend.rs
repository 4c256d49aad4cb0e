//! Where the backend lives and how we authenticate to it.

use anyhow::{Context, Result};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use url::Url;

/// Bearer credential for outbound calls. Never printed.
#[derive(Clone)]
pub struct ServiceCredential(String);

impl ServiceCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Read the credential from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        let value = std::env::var(var)
            .with_context(|| format!("backend auth not configured: {var} is unset"))?;
        if value.trim().is_empty() {
            anyhow::bail!("backend auth not configured: {var} is empty");
        }
        Ok(Self(value))
    }

    pub(crate) fn header_value(&self) -> Option<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0)).ok()?;
        value.set_sensitive(true);
        Some(value)
    }

    pub(crate) fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.header_value() {
            Some(v) => req.header(AUTHORIZATION, v),
            None => req,
        }
    }
}

impl std::fmt::Debug for ServiceCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServiceCredential(***)")
    }
}

/// Base URL of the backend API, e.g. `http://127.0.0.1:8000/api/v1`.
#[derive(Debug, Clone)]
pub struct Backend {
    base: Url,
}

impl Backend {
    pub fn parse(base: &str) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid backend_url {base:?}"))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("backend_url must be http or https, got {}", base.scheme());
        }
        Ok(Self { base })
    }

    /// Absolute URL for a backend path. A missing leading `/` is added; the
    /// query string, if any, is passed through as-is.
    pub fn url(&self, path: &str) -> String {
        let base = self.base.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn with_query(url: String, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{url}?{q}"),
            _ => url,
        }
    }
}
