use std::path::{Path, PathBuf};
use std::str::FromStr;

use multiapi_common::config::{
    default_rate_limits, SystemConfig, TransportKind, CATEGORY_NEWS, CATEGORY_WEATHER,
};

use super::validation;

/// Load configuration from `path`, then apply environment overrides.
///
/// A missing file means "all defaults". An unreadable or unparsable file, or
/// a configuration that fails validation, is fatal: the server refuses to
/// start.
pub fn load_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// [`load_config`] with an injectable environment lookup.
pub fn load_config_with_env<F>(path: &Path, env: F) -> Result<SystemConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    tracing::info!(path = %path.display(), "Loading configuration");

    let mut config = if path.exists() {
        load_system_config(path)?
    } else {
        tracing::warn!(
            path = %path.display(),
            "Config file does not exist, using defaults"
        );
        SystemConfig::default()
    };

    // Built-in categories stay configured unless the file overrides them.
    let mut rate_limits = default_rate_limits();
    rate_limits.append(&mut config.rate_limits);
    config.rate_limits = rate_limits;

    apply_env_overrides(&mut config, &env);

    validation::validate(&config)?;

    tracing::info!(
        transport = ?config.server.transport,
        categories = config.rate_limits.len(),
        "Configuration loaded successfully"
    );

    Ok(config)
}

fn load_system_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn apply_env_overrides<F>(config: &mut SystemConfig, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = parsed(env, "PORT") {
        config.server.port = port;
    }
    if let Some(transport) = env("MULTIAPI_TRANSPORT") {
        match transport.to_ascii_lowercase().as_str() {
            "http" => config.server.transport = TransportKind::Http,
            "stdio" => config.server.transport = TransportKind::Stdio,
            other => tracing::warn!(value = %other, "Ignoring unknown MULTIAPI_TRANSPORT"),
        }
    }

    let cache = &mut config.cache;
    for (name, field) in [
        ("CACHE_TTL_DEFAULT", &mut cache.default_ttl_seconds),
        ("CACHE_TTL_WEATHER", &mut cache.weather_ttl_seconds),
        ("CACHE_TTL_FINANCE", &mut cache.finance_ttl_seconds),
        ("CACHE_TTL_NEWS", &mut cache.news_ttl_seconds),
    ] {
        if let Some(value) = parsed(env, name) {
            *field = value;
        }
    }

    // The general-purpose categories share one env-tunable policy; finance
    // keeps its tighter built-in quota.
    let requests: Option<u32> = parsed(env, "RATE_LIMIT_REQUESTS");
    let window: Option<u64> = parsed(env, "RATE_LIMIT_WINDOW");
    for category in [CATEGORY_WEATHER, CATEGORY_NEWS] {
        if let Some(policy) = config.rate_limits.get_mut(category) {
            if let Some(requests) = requests {
                policy.max_requests = requests;
            }
            if let Some(window) = window {
                policy.window_ms = window;
            }
        }
    }

    let upstream = &mut config.upstream;
    for (name, field) in [
        ("OPENWEATHER_API_KEY", &mut upstream.openweather_api_key),
        ("ALPHA_VANTAGE_API_KEY", &mut upstream.alpha_vantage_api_key),
        ("NEWS_API_KEY", &mut upstream.news_api_key),
    ] {
        if let Some(key) = env(name).filter(|k| !k.trim().is_empty()) {
            *field = Some(key);
        }
    }

    for (name, present) in [
        ("OpenWeather", upstream.openweather_api_key.is_some()),
        ("Alpha Vantage", upstream.alpha_vantage_api_key.is_some()),
        ("NewsAPI", upstream.news_api_key.is_some()),
    ] {
        if !present {
            tracing::warn!(api = name, "API key not configured, its tools will fail");
        }
    }
}

/// Read and parse a numeric env var. Unparsable values are ignored.
fn parsed<T, F>(env: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = env(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for multiapi_common::MultiApiError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
