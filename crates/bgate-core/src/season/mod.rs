//! Season identifier resolution and season-scoped backend calls.
//!
//! Call sites address seasons as (show, season number) but the backend wants
//! the season id. A caller that already holds a valid id can pass it as a
//! hint; the hint is trusted without a storage round-trip.

mod lookup;

pub use lookup::{HttpSeasonLookup, SeasonLookup};

use serde_json::Value;

use crate::backend::Backend;
use crate::error::ProxyError;
use crate::gateway::{CallOptions, JsonGateway};

/// True for a hyphenated RFC 4122 UUID of version 1 through 5.
pub fn is_season_id(value: &str) -> bool {
    if value.len() != 36 {
        return false;
    }
    match uuid::Uuid::try_parse(value) {
        Ok(id) => {
            matches!(id.get_version_num(), 1..=5) && id.get_variant() == uuid::Variant::RFC4122
        }
        Err(_) => false,
    }
}

/// Integer prefix of `text`, the way a lenient form parser reads it:
/// surrounding whitespace ignored, optional sign, digits up to the first non-digit.
pub fn parse_season_number(text: &str) -> Option<i32> {
    let s = text.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let n: i64 = digits[..end].parse().ok()?;
    i32::try_from(sign * n).ok()
}

#[derive(Debug, Clone)]
pub struct SeasonResolver<L> {
    lookup: L,
}

impl<L: SeasonLookup> SeasonResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    /// Resolve (show, season number) to a season id.
    ///
    /// A syntactically valid `hint` is returned unchanged with zero lookups.
    pub async fn resolve(
        &self,
        show_id: &str,
        season_number: &str,
        hint: Option<&str>,
    ) -> Result<String, ProxyError> {
        if let Some(hint) = hint.filter(|h| is_season_id(h)) {
            return Ok(hint.to_string());
        }
        let number = parse_season_number(season_number).ok_or_else(ProxyError::invalid_season_number)?;
        match self.lookup.season_id(show_id, number).await? {
            Some(id) if !id.is_empty() => Ok(id),
            _ => {
                tracing::debug!(show_id, number, "season lookup found nothing");
                Err(ProxyError::season_not_found())
            }
        }
    }
}

/// Options for a season-scoped call.
#[derive(Debug, Clone)]
pub struct SeasonCall {
    pub call: CallOptions,
    pub query: Option<String>,
    pub season_id_hint: Option<String>,
}

impl SeasonCall {
    pub fn new(call: CallOptions) -> Self {
        Self {
            call,
            query: None,
            season_id_hint: None,
        }
    }
}

/// Season-scoped calls: resolve the id, then go through the JSON gateway.
#[derive(Debug, Clone)]
pub struct SeasonGateway<L> {
    backend: Backend,
    gateway: JsonGateway,
    resolver: SeasonResolver<L>,
}

impl<L: SeasonLookup> SeasonGateway<L> {
    pub fn new(backend: Backend, gateway: JsonGateway, lookup: L) -> Self {
        Self {
            backend,
            gateway,
            resolver: SeasonResolver::new(lookup),
        }
    }

    /// `<backend>/admin/socials/seasons/<id><season_path>[?query]`.
    pub async fn season_url(
        &self,
        show_id: &str,
        season_number: &str,
        season_path: &str,
        call: &SeasonCall,
    ) -> Result<String, ProxyError> {
        let season_id = self
            .resolver
            .resolve(show_id, season_number, call.season_id_hint.as_deref())
            .await?;
        let path = if season_path.starts_with('/') {
            season_path.to_string()
        } else {
            format!("/{season_path}")
        };
        let url = self.backend.url(&format!("/admin/socials/seasons/{season_id}{path}"));
        Ok(Backend::with_query(url, call.query.as_deref()))
    }

    pub async fn fetch_json(
        &self,
        show_id: &str,
        season_number: &str,
        season_path: &str,
        call: &SeasonCall,
    ) -> Result<Value, ProxyError> {
        let url = self.season_url(show_id, season_number, season_path, call).await?;
        self.gateway.call(&url, &call.call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CountingLookup {
        calls: Arc<AtomicUsize>,
        id: Option<String>,
    }

    #[async_trait::async_trait]
    impl SeasonLookup for CountingLookup {
        async fn season_id(&self, _show_id: &str, _n: i32) -> Result<Option<String>, ProxyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.id.clone())
        }
    }

    #[test]
    fn season_id_syntax() {
        assert!(is_season_id("22222222-2222-4222-8222-222222222222"));
        assert!(is_season_id("22222222-2222-4222-8222-22222222222A"));
        assert!(!is_season_id("not-a-uuid"));
        assert!(!is_season_id("22222222222242228222222222222222"));
        assert!(!is_season_id("22222222-2222-6222-8222-222222222222"));
        assert!(!is_season_id("22222222-2222-4222-c222-222222222222"));
    }

    #[test]
    fn season_number_parsing_is_lenient_prefix() {
        assert_eq!(parse_season_number("6"), Some(6));
        assert_eq!(parse_season_number(" 12 "), Some(12));
        assert_eq!(parse_season_number("6abc"), Some(6));
        assert_eq!(parse_season_number("-1"), Some(-1));
        assert_eq!(parse_season_number("abc"), None);
        assert_eq!(parse_season_number(""), None);
        assert_eq!(parse_season_number("99999999999"), None);
    }

    #[tokio::test]
    async fn invalid_hint_falls_back_to_lookup() {
        let lookup = CountingLookup {
            id: Some("season-6".into()),
            ..Default::default()
        };
        let resolver = SeasonResolver::new(lookup.clone());
        let id = resolver.resolve("show-1", "6", Some("not-a-uuid")).await.unwrap();
        assert_eq!(id, "season-6");
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn valid_hint_skips_lookup() {
        let lookup = CountingLookup::default();
        let resolver = SeasonResolver::new(lookup.clone());
        let hint = "22222222-2222-4222-8222-222222222222";
        let id = resolver.resolve("show-1", "6", Some(hint)).await.unwrap();
        assert_eq!(id, hint);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_number_and_missing_season() {
        let resolver = SeasonResolver::new(CountingLookup::default());
        let err = resolver.resolve("show-1", "six", None).await.unwrap_err();
        assert_eq!(err.status, 400);
        let err = resolver.resolve("show-1", "6", None).await.unwrap_err();
        assert_eq!(err.status, 404);
        assert_eq!(err.code, crate::error::ProxyErrorCode::SeasonNotFound);
    }
}
