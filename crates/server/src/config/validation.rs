use multiapi_common::config::{SystemConfig, TransportKind};

use super::loader::ConfigError;

/// Upper bound on any configured TTL: thirty days.
const MAX_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Validate the complete system configuration.
///
/// Collects every problem rather than stopping at the first, so one failed
/// start reports everything that needs fixing.
pub fn validate(config: &SystemConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_server(config, &mut errors);
    validate_cache(config, &mut errors);
    validate_rate_limits(config, &mut errors);
    validate_upstream(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.join("; ")))
    }
}

fn validate_server(config: &SystemConfig, errors: &mut Vec<String>) {
    if config.server.transport == TransportKind::Http && config.server.port == 0 {
        errors.push("server.port must be > 0 for the http transport".into());
    }
}

fn validate_cache(config: &SystemConfig, errors: &mut Vec<String>) {
    let c = &config.cache;

    if c.default_ttl_seconds == 0 {
        errors.push("cache.default_ttl_seconds must be > 0".into());
    }
    if c.sweep_interval_seconds == 0 {
        errors.push("cache.sweep_interval_seconds must be > 0".into());
    }

    for (name, ttl) in [
        ("default_ttl_seconds", c.default_ttl_seconds),
        ("weather_ttl_seconds", c.weather_ttl_seconds),
        ("finance_ttl_seconds", c.finance_ttl_seconds),
        ("news_ttl_seconds", c.news_ttl_seconds),
    ] {
        if ttl > MAX_TTL_SECONDS {
            errors.push(format!("cache.{} must be <= {}", name, MAX_TTL_SECONDS));
        }
    }
}

fn validate_rate_limits(config: &SystemConfig, errors: &mut Vec<String>) {
    for (category, policy) in &config.rate_limits {
        if category.trim().is_empty() {
            errors.push("rate_limits category names must not be empty".into());
        }
        if policy.max_requests == 0 {
            errors.push(format!("rate_limits.{}.max_requests must be > 0", category));
        }
        if policy.window_ms == 0 {
            errors.push(format!("rate_limits.{}.window_ms must be > 0", category));
        }
    }
}

fn validate_upstream(config: &SystemConfig, errors: &mut Vec<String>) {
    let u = &config.upstream;

    if u.timeout_seconds == 0 {
        errors.push("upstream.timeout_seconds must be > 0".into());
    }

    for (name, url) in [
        ("openweather_base_url", &u.openweather_base_url),
        ("alpha_vantage_base_url", &u.alpha_vantage_base_url),
        ("news_api_base_url", &u.news_api_base_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!("upstream.{} must be an http(s) URL", name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiapi_common::config::RateLimitPolicy;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&SystemConfig::with_default_policies()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = SystemConfig::with_default_policies();
        config.cache.sweep_interval_seconds = 0;
        config.upstream.timeout_seconds = 0;
        config
            .rate_limits
            .insert("finance".into(), RateLimitPolicy::new(5, 0));

        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("cache.sweep_interval_seconds"));
        assert!(err.contains("upstream.timeout_seconds"));
        assert!(err.contains("rate_limits.finance.window_ms"));
    }

    #[test]
    fn test_rejects_out_of_range_ttl() {
        let mut config = SystemConfig::with_default_policies();
        config.cache.weather_ttl_seconds = u64::MAX;

        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("cache.weather_ttl_seconds"));

        config.cache.weather_ttl_seconds = MAX_TTL_SECONDS;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_port_zero_allowed_for_stdio() {
        let mut config = SystemConfig::with_default_policies();
        config.server.port = 0;
        assert!(validate(&config).is_err());

        config.server.transport = TransportKind::Stdio;
        assert!(validate(&config).is_ok());
    }
}
