// src/config/models.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_FEED_URL: &str =
    "https://cdn.jsdelivr.net/gh/proxifly/free-proxy-list@main/proxies/all/data.txt";
pub const DEFAULT_TARGET_URL: &str = "https://quote.eastmoney.com/";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub feed: FeedConfig,
    pub probe: ProbeConfig,
    pub store: StoreConfig,
    pub schedule: ScheduleConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.feed.url).context("feed.url is not a valid URL")?;
        Url::parse(&self.probe.target_url).context("probe.target_url is not a valid URL")?;

        if self.feed.timeout_secs == 0 {
            bail!("feed.timeout_secs must be greater than zero");
        }
        if self.feed.allowed_schemes.is_empty() {
            bail!("feed.allowed_schemes must not be empty");
        }
        if self
            .feed
            .allowed_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case("socks4"))
        {
            bail!("feed.allowed_schemes: socks4 proxies cannot be probed");
        }

        if self.probe.timeout_secs == 0 {
            bail!("probe.timeout_secs must be greater than zero");
        }
        if self.probe.max_concurrency == 0 {
            bail!("probe.max_concurrency must be greater than zero");
        }

        if self.store.primary_key.is_empty() || self.store.staging_key.is_empty() {
            bail!("store keys must not be empty");
        }
        if self.store.primary_key == self.store.staging_key {
            bail!(
                "store.primary_key and store.staging_key must differ (both are {:?})",
                self.store.primary_key
            );
        }
        if self.store.backend == StoreBackendKind::Redis {
            let url = Url::parse(&self.store.url).context("store.url is not a valid URL")?;
            if !matches!(url.scheme(), "redis" | "rediss") {
                bail!("store.url must use redis:// or rediss://, got {}", url.scheme());
            }
        }

        if self.schedule.ingest_interval_secs == 0 || self.schedule.revalidate_interval_secs == 0 {
            bail!("schedule intervals must be greater than zero");
        }

        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            bail!("metrics.path must start with '/'");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], 8000).into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Proxy schemes the prober can route through. Anything else is dropped at fetch time.
    pub allowed_schemes: Vec<String>,
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            timeout_secs: 20,
            allowed_schemes: default_schemes(),
        }
    }
}

pub fn default_schemes() -> Vec<String> {
    ["http", "https", "socks5", "socks5h"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub target_url: String,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            timeout_secs: 8,
            max_concurrency: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    /// Only read by the redis backend.
    pub url: String,
    pub primary_key: String,
    pub staging_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    Memory,
    Redis,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Memory,
            url: "redis://127.0.0.1:6379/".to_string(),
            primary_key: "proxies".to_string(),
            staging_key: "proxies_temp_revalidation".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub ingest_interval_secs: u64,
    pub revalidate_interval_secs: u64,
    pub ingest_on_start: bool,
    pub drain_timeout_secs: u64,
}

impl ScheduleConfig {
    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_interval_secs)
    }

    pub fn revalidate_interval(&self) -> Duration {
        Duration::from_secs(self.revalidate_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ingest_interval_secs: 3600,
            revalidate_interval_secs: 1800,
            ingest_on_start: true,
            drain_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.probe.max_concurrency, 100);
        assert_eq!(config.probe.timeout(), Duration::from_secs(8));
        assert_eq!(config.schedule.ingest_interval(), Duration::from_secs(3600));
        assert_eq!(config.schedule.revalidate_interval(), Duration::from_secs(1800));
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = "probe:\n  max_concurrency: 25\nstore:\n  primary_key: live\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.probe.max_concurrency, 25);
        assert_eq!(config.probe.timeout_secs, 8);
        assert_eq!(config.store.primary_key, "live");
        assert_eq!(config.store.staging_key, "proxies_temp_revalidation");
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = Config::default();
        config.probe.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_shared_store_keys() {
        let mut config = Config::default();
        config.store.staging_key = config.store.primary_key.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn redis_backend_from_yaml() {
        let yaml = "store:\n  backend: redis\n  url: redis://cache:6380/2\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.store.backend, StoreBackendKind::Redis);
        assert_eq!(config.store.url, "redis://cache:6380/2");
        config.validate().unwrap();
    }

    #[test]
    fn rejects_redis_backend_with_http_url() {
        let mut config = Config::default();
        config.store.backend = StoreBackendKind::Redis;
        config.store.url = "http://cache:6379".to_string();
        assert!(config.validate().is_err());

        config.store.backend = StoreBackendKind::Memory;
        config.validate().unwrap();
    }

    #[test]
    fn rejects_socks4_scheme() {
        let mut config = Config::default();
        config.feed.allowed_schemes.push("SOCKS4".to_string());
        assert!(config.validate().is_err());
    }
}
