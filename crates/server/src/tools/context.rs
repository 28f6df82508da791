use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use multiapi_common::config::{CacheConfig, UpstreamConfig};

use super::error::ToolError;
use crate::cache::{Ttl, TtlCache};
use crate::rate_limit::RateLimiter;

/// Max characters of an upstream error body quoted back in a tool error.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Shared context available to all tool handlers.
///
/// Cache and rate limiter are shared by every handler; none may assume
/// exclusive access.
pub struct ToolContext {
    pub cache: Arc<TtlCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub http: reqwest::Client,
    pub upstream: UpstreamConfig,
    pub cache_ttls: CacheConfig,
}

impl ToolContext {
    pub fn new(
        cache: Arc<TtlCache>,
        rate_limiter: Arc<RateLimiter>,
        http: reqwest::Client,
        upstream: UpstreamConfig,
        cache_ttls: CacheConfig,
    ) -> Self {
        Self {
            cache,
            rate_limiter,
            http,
            upstream,
            cache_ttls,
        }
    }

    /// Serve `key` from cache, or admit one request against `category` and
    /// run `fetch`, caching its result for `ttl`.
    ///
    /// Two concurrent misses on the same key both fetch; there is no
    /// request coalescing. Failed fetches are not cached.
    pub async fn cached<F, Fut>(
        &self,
        key: &str,
        category: &str,
        ttl: Ttl,
        fetch: F,
    ) -> Result<Value, ToolError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ToolError>>,
    {
        if let Some(hit) = self.cache.get(key) {
            tracing::info!(key = %key, "Returning cached result");
            return Ok(hit);
        }

        self.rate_limiter.check(category)?;

        let value = fetch().await?;
        self.cache.set(key, value.clone(), ttl);
        tracing::info!(key = %key, "Fetched and cached result");

        Ok(value)
    }

    /// GET `url` with `query` and decode the JSON body.
    ///
    /// Transport failures, non-2xx statuses and undecodable bodies all become
    /// [`ToolError::Upstream`] prefixed with `what`.
    pub async fn get_json(
        &self,
        what: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ToolError> {
        let start = std::time::Instant::now();

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ToolError::Upstream(format!("Failed to fetch {}: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(what = %what, status = %status, "Upstream returned error status");
            return Err(ToolError::Upstream(format!(
                "Failed to fetch {}: upstream returned {}: {}",
                what,
                status,
                truncate_body(body.trim(), MAX_ERROR_BODY_CHARS)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Upstream(format!("Failed to fetch {}: {}", what, e)))?;

        metrics::histogram!("upstream.request.latency", "what" => what.to_string())
            .record(start.elapsed().as_secs_f64());

        Ok(body)
    }
}

/// Cut `body` to at most `max_chars` characters, noting how many were dropped.
fn truncate_body(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!(
            "{} [{} more chars omitted]",
            &body[..cut],
            body[cut..].chars().count()
        ),
        None => body.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> ToolContext {
    use std::collections::BTreeMap;
    use std::time::Duration;

    ToolContext::new(
        Arc::new(TtlCache::new(Duration::from_secs(600))),
        Arc::new(RateLimiter::new(BTreeMap::from([(
            "test".to_string(),
            multiapi_common::config::RateLimitPolicy::new(1, 60_000),
        )]))),
        reqwest::Client::new(),
        UpstreamConfig::default(),
        CacheConfig::default(),
    )
}
