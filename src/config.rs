//! Configuration for the default HTTP transport.
//!
//! Values come from code, from `PARALLEL_REQUESTS_*` environment variables, or
//! from a YAML document. Unparsable environment values fall back to defaults.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

pub const ENV_BASE_URL: &str = "PARALLEL_REQUESTS_BASE_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "PARALLEL_REQUESTS_HTTP_TIMEOUT_SECS";
pub const ENV_POOL_MAX_IDLE_PER_HOST: &str = "PARALLEL_REQUESTS_POOL_MAX_IDLE_PER_HOST";
pub const ENV_POOL_IDLE_TIMEOUT_SECS: &str = "PARALLEL_REQUESTS_POOL_IDLE_TIMEOUT_SECS";
pub const ENV_PROXY_URL: &str = "PARALLEL_REQUESTS_PROXY_URL";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 32;
const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Prefix for relative request URLs.
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub proxy: Option<String>,
    /// Sent with every request unless the descriptor sets the same header.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS),
            proxy: None,
            default_headers: BTreeMap::new(),
        }
    }
}

/// On-disk form; durations are whole seconds.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    pool_max_idle_per_host: Option<usize>,
    pool_idle_timeout_secs: Option<u64>,
    proxy: Option<String>,
    default_headers: BTreeMap<String, String>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with whatever `PARALLEL_REQUESTS_*` variables are set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var(ENV_BASE_URL).ok().filter(|s| !s.trim().is_empty()),
            timeout: env_parse::<u64>(ENV_HTTP_TIMEOUT_SECS)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            pool_max_idle_per_host: env_parse(ENV_POOL_MAX_IDLE_PER_HOST)
                .unwrap_or(defaults.pool_max_idle_per_host),
            pool_idle_timeout: env_parse::<u64>(ENV_POOL_IDLE_TIMEOUT_SECS)
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool_idle_timeout),
            proxy: env::var(ENV_PROXY_URL).ok().filter(|s| !s.trim().is_empty()),
            default_headers: defaults.default_headers,
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content).map_err(|e| {
            Error::configuration_with_context(
                "invalid client configuration",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("client_config"),
            )
        })?;
        let defaults = Self::default();
        let cfg = Self {
            base_url: file.base_url,
            timeout: file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            pool_max_idle_per_host: file
                .pool_max_idle_per_host
                .unwrap_or(defaults.pool_max_idle_per_host),
            pool_idle_timeout: file
                .pool_idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool_idle_timeout),
            proxy: file.proxy,
            default_headers: file.default_headers,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_default_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Checks that `base_url`, when present, is an absolute URL.
    pub fn validate(&self) -> Result<()> {
        if let Some(base) = &self.base_url {
            url::Url::parse(base).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid base url '{}'", base),
                    ErrorContext::new()
                        .with_field_path("base_url")
                        .with_details(e.to_string())
                        .with_source("client_config"),
                )
            })?;
        }
        Ok(())
    }
}
