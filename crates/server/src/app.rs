use std::sync::Arc;
use std::time::Duration;

use multiapi_common::config::SystemConfig;
use multiapi_common::{MultiApiError, Result};

use crate::cache::TtlCache;
use crate::dispatch::Dispatcher;
use crate::rate_limit::RateLimiter;
use crate::tools::{handlers, ToolContext, ToolRegistry};

/// The composed server: one cache, one rate limiter and one registry,
/// constructed explicitly and shared by every transport and handler.
#[derive(Clone)]
pub struct App {
    pub cache: Arc<TtlCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub dispatcher: Dispatcher,
}

impl App {
    /// Build the app with the weather, finance and news tools registered.
    pub fn from_config(config: &SystemConfig) -> Result<Self> {
        Self::with_tools(config, handlers::register_all)
    }

    /// Build the app, letting `register` populate the registry.
    pub fn with_tools<F>(config: &SystemConfig, register: F) -> Result<Self>
    where
        F: FnOnce(&mut ToolRegistry),
    {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(
            config.cache.default_ttl_seconds,
        )));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));

        let http = reqwest::Client::builder()
            .user_agent(config.upstream.user_agent.clone())
            .timeout(Duration::from_secs(config.upstream.timeout_seconds))
            .build()
            .map_err(|e| MultiApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let context = ToolContext::new(
            Arc::clone(&cache),
            Arc::clone(&rate_limiter),
            http,
            config.upstream.clone(),
            config.cache.clone(),
        );

        let mut registry = ToolRegistry::new(context);
        register(&mut registry);
        tracing::info!(tools = registry.len(), "Tool registry ready");

        Ok(Self {
            cache,
            rate_limiter,
            dispatcher: Dispatcher::new(Arc::new(registry)),
        })
    }
}
