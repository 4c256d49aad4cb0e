use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::Backend;
use crate::retry::RetryPolicy;
use crate::stream::RelaySettings;

/// JSON gateway tuning (`[gateway]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Extra attempts after the first when a call does not say otherwise.
    pub default_retries: u32,
    /// Per-attempt deadline in milliseconds.
    pub timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            default_retries: 0,
            timeout_ms: 30_000,
            backoff_base_ms: 150,
            backoff_cap_ms: 5_000,
        }
    }
}

impl GatewaySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.default_retries.saturating_add(1),
            per_attempt_timeout: Duration::from_millis(self.timeout_ms),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_cap: Duration::from_millis(self.backoff_cap_ms),
            multiplier: 2,
        }
    }
}

/// Stream relay tuning (`[stream]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub connect_attempts: u32,
    /// Per connect attempt; first bytes of a long operation may take minutes.
    pub connect_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// 0 disables connect heartbeats.
    pub heartbeat_interval_ms: u64,
    pub idle_timeout_ms: u64,
    /// Backend path probed (GET) before connecting, e.g. "/health".
    pub preflight_path: Option<String>,
    pub preflight_timeout_ms: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            connect_timeout_ms: 600_000,
            backoff_base_ms: 250,
            backoff_cap_ms: 2_000,
            heartbeat_interval_ms: 15_000,
            idle_timeout_ms: 600_000,
            preflight_path: None,
            preflight_timeout_ms: 3_000,
        }
    }
}

impl StreamSection {
    pub fn connect_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts.max(1),
            per_attempt_timeout: Duration::from_millis(self.connect_timeout_ms),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_cap: Duration::from_millis(self.backoff_cap_ms),
            multiplier: 2,
        }
    }

    pub fn relay_settings(&self, backend: &Backend) -> RelaySettings {
        RelaySettings {
            connect: self.connect_policy(),
            heartbeat_interval: (self.heartbeat_interval_ms > 0)
                .then(|| Duration::from_millis(self.heartbeat_interval_ms)),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            preflight_url: self.preflight_path.as_deref().map(|p| backend.url(p)),
            preflight_timeout: Duration::from_millis(self.preflight_timeout_ms),
            ..RelaySettings::default()
        }
    }
}

/// Batch fan-out ceilings (`[batch]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    /// Maximum backend calls in flight for one batch.
    pub concurrency: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self { concurrency: 3 }
    }
}

/// Global configuration loaded from `~/.config/bgate/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the backend API.
    pub backend_url: String,
    /// Environment variable holding the backend bearer credential.
    pub service_token_env: String,
    /// Listen address for `bgate serve`.
    pub listen: String,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub batch: BatchSection,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000/api/v1".to_string(),
            service_token_env: "BGATE_SERVICE_TOKEN".to_string(),
            listen: "127.0.0.1:8787".to_string(),
            gateway: GatewaySection::default(),
            stream: StreamSection::default(),
            batch: BatchSection::default(),
        }
    }
}

impl GatewayConfig {
    pub fn backend(&self) -> Result<Backend> {
        Backend::parse(&self.backend_url)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bgate")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<GatewayConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = GatewayConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<GatewayConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cfg: GatewayConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    cfg.backend()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.gateway.default_retries, 0);
        assert_eq!(cfg.gateway.timeout_ms, 30_000);
        assert_eq!(cfg.stream.connect_attempts, 5);
        assert_eq!(cfg.batch.concurrency, 3);
        assert!(cfg.stream.preflight_path.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = GatewayConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: GatewayConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let toml = r#"
            backend_url = "https://backend.example.com/api/v1"
            service_token_env = "SERVICE_KEY"
            listen = "0.0.0.0:9000"

            [stream]
            connect_attempts = 2
            heartbeat_interval_ms = 0
        "#;
        let cfg: GatewayConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.gateway, GatewaySection::default());
        assert_eq!(cfg.stream.connect_attempts, 2);
        assert_eq!(cfg.stream.backoff_base_ms, 250);
        let backend = cfg.backend().unwrap();
        let relay = cfg.stream.relay_settings(&backend);
        assert!(relay.heartbeat_interval.is_none());
        assert_eq!(relay.connect.max_attempts, 2);
    }

    #[test]
    fn sections_convert_to_policies() {
        let g = GatewaySection {
            default_retries: 2,
            ..GatewaySection::default()
        };
        let p = g.policy();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.delay_after(2), Duration::from_millis(300));

        let s = StreamSection {
            connect_attempts: 0,
            preflight_path: Some("/health".into()),
            ..StreamSection::default()
        };
        assert_eq!(s.connect_policy().max_attempts, 1);
        let backend = Backend::parse("http://b.local/api/v1").unwrap();
        assert_eq!(
            s.relay_settings(&backend).preflight_url.as_deref(),
            Some("http://b.local/api/v1/health")
        );
    }

    #[test]
    fn load_from_rejects_bad_backend_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "backend_url = \"nope\"\nservice_token_env = \"X\"\nlisten = \"127.0.0.1:1\"\n",
        )
        .unwrap();
        assert!(load_from(&path).is_err());
    }
}
