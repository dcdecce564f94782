//! Static TOML configuration, loaded once at startup. Unlike cache or
//! transport errors, a bad config is fatal: `load` returns
//! `ForwarderError::ConfigInvalid` and the caller is expected to exit.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ForwarderError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(rename = "upstream", default)]
    pub upstreams: Vec<UpstreamConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(rename = "matcher", default)]
    pub matchers: Vec<MatcherConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub udp_bind: Option<SocketAddr>,
    pub tcp_bind: Option<SocketAddr>,
    pub dot_bind: Option<SocketAddr>,
    pub doh_bind: Option<SocketAddr>,
    pub doq_bind: Option<SocketAddr>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    #[serde(default)]
    pub metrics_bind: Option<SocketAddr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,
    #[serde(default)]
    pub tls_ca_path: Option<String>,
    #[serde(default)]
    pub tls_insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub compress: bool,
    #[serde(default = "default_true")]
    pub lazy_refresh: bool,
    #[serde(default)]
    pub cache_everything: bool,
    #[serde(default)]
    pub lazy_cache_ttl: Option<u64>,
    #[serde(default = "default_cleaner_interval_secs")]
    pub cleaner_interval_secs: u64,
}

fn default_cache_capacity() -> usize {
    65_536
}

fn default_shard_count() -> usize {
    16
}

fn default_true() -> bool {
    true
}

fn default_cleaner_interval_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            shard_count: default_shard_count(),
            redis_url: None,
            compress: false,
            lazy_refresh: true,
            cache_everything: false,
            lazy_cache_ttl: None,
            cleaner_interval_secs: default_cleaner_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatcherConfig {
    pub name: String,
    pub rule_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ForwarderError::ConfigInvalid(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|e| ForwarderError::ConfigInvalid(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.udp_bind.is_none()
            && self.server.tcp_bind.is_none()
            && self.server.dot_bind.is_none()
            && self.server.doh_bind.is_none()
            && self.server.doq_bind.is_none()
        {
            return Err(ForwarderError::ConfigInvalid(
                "no server front-end is bound; configure at least one of udp_bind/tcp_bind/dot_bind/doh_bind/doq_bind".to_string(),
            ));
        }
        if self.upstreams.is_empty() {
            return Err(ForwarderError::ConfigInvalid(
                "at least one [[upstream]] must be configured".to_string(),
            ));
        }
        for upstream in &self.upstreams {
            crate::upstream::url::parse(&upstream.url)?;
        }
        if (self.server.dot_bind.is_some() || self.server.doq_bind.is_some())
            && self.server.tls_cert_path.is_none()
        {
            tracing::warn!(
                "dot/doq bound with no tls_cert_path configured; a throwaway self-signed certificate will be generated at startup"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_config_with_no_front_end() {
        let toml = r#"
            [server]

            [[upstream]]
            url = "udp://1.1.1.1"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_config_with_no_upstream() {
        let toml = r#"
            [server]
            udp_bind = "127.0.0.1:5353"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_minimal_valid_config() {
        let toml = r#"
            [server]
            udp_bind = "127.0.0.1:5353"

            [[upstream]]
            url = "udp://1.1.1.1"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
    }
}
