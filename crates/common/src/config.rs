use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level system configuration, deserialized from system.toml.
///
/// Every section is defaulted so an absent file or a partial file is valid.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    /// Rate-limit policy per category name.
    pub rate_limits: BTreeMap<String, RateLimitPolicy>,
    pub upstream: UpstreamConfig,
}

impl SystemConfig {
    /// Configuration with the built-in rate-limit policies filled in.
    pub fn with_default_policies() -> Self {
        Self {
            rate_limits: default_rate_limits(),
            ..Self::default()
        }
    }
}

/// Which outer transport the binary serves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Http,
    Stdio,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: TransportKind,
    /// HTTP listen port (ignored for stdio).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Http,
            port: 3000,
        }
    }
}

/// Cache TTL configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a caller passes no TTL (or zero).
    pub default_ttl_seconds: u64,
    /// Interval of the background expiry sweep.
    pub sweep_interval_seconds: u64,
    pub weather_ttl_seconds: u64,
    pub finance_ttl_seconds: u64,
    pub news_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 600,
            sweep_interval_seconds: 120,
            weather_ttl_seconds: 300,
            finance_ttl_seconds: 60,
            news_ttl_seconds: 600,
        }
    }
}

/// Fixed-window policy for one rate-limit category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }
}

pub const CATEGORY_WEATHER: &str = "weather";
pub const CATEGORY_FINANCE: &str = "finance";
pub const CATEGORY_NEWS: &str = "news";

/// Built-in policies. Alpha Vantage's free tier is far stricter than the
/// other upstreams, so finance gets its own tight window.
pub fn default_rate_limits() -> BTreeMap<String, RateLimitPolicy> {
    BTreeMap::from([
        (CATEGORY_WEATHER.to_string(), RateLimitPolicy::new(100, 60_000)),
        (CATEGORY_FINANCE.to_string(), RateLimitPolicy::new(5, 60_000)),
        (CATEGORY_NEWS.to_string(), RateLimitPolicy::new(100, 60_000)),
    ])
}

/// Third-party API endpoints and credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub openweather_base_url: String,
    pub alpha_vantage_base_url: String,
    pub news_api_base_url: String,
    #[serde(skip_serializing)]
    pub openweather_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub alpha_vantage_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub news_api_key: Option<String>,
    /// Per-request timeout for upstream calls.
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            openweather_base_url: "https://api.openweathermap.org/data/2.5".into(),
            alpha_vantage_base_url: "https://www.alphavantage.co/query".into(),
            news_api_base_url: "https://newsapi.org/v2".into(),
            openweather_api_key: None,
            alpha_vantage_api_key: None,
            news_api_key: None,
            timeout_seconds: 10,
            user_agent: "multiapi-server/0.1".into(),
        }
    }
}
