use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use multiapi_common::config::RateLimitPolicy;

/// Per-category rate limiter using a fixed-window counter.
///
/// A window admits `max_requests` calls and then rejects until it rolls over.
/// Bursts straddling a boundary can reach twice the nominal rate; that is the
/// accepted cost of the fixed window.
pub struct RateLimiter {
    /// Immutable after construction.
    policies: HashMap<String, RateLimitPolicy>,
    /// Guards every window. Never held across an await point.
    windows: Mutex<HashMap<String, RateWindow>>,
}

#[derive(Clone, Copy, Debug)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

impl RateWindow {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now + window,
        }
    }
}

/// Returned when a category has used up its current window.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Rate limit exceeded for {category}. Please wait {retry_after_secs} seconds.")]
pub struct RateLimitExceeded {
    pub category: String,
    /// Time until the window resets, rounded up to whole seconds.
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new(policies: BTreeMap<String, RateLimitPolicy>) -> Self {
        Self {
            policies: policies.into_iter().collect(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit one request for `category`, or fail fast if its window is full.
    ///
    /// A rejected call does not consume quota. Categories without a policy
    /// are unbounded.
    pub fn check(&self, category: &str) -> Result<(), RateLimitExceeded> {
        let Some(policy) = self.policies.get(category) else {
            tracing::warn!(category = %category, "No rate limit configured for category");
            return Ok(());
        };
        let window = Duration::from_millis(policy.window_ms);
        let now = Instant::now();

        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = windows
            .entry(category.to_string())
            .or_insert_with(|| RateWindow::open(now, window));

        if now > state.reset_at {
            *state = RateWindow::open(now, window);
        }

        if state.count >= policy.max_requests {
            let wait = state.reset_at.saturating_duration_since(now);
            let retry_after_secs = wait.as_millis().div_ceil(1000) as u64;
            tracing::warn!(
                category = %category,
                wait_ms = wait.as_millis() as u64,
                "Rate limit exceeded"
            );
            metrics::counter!("rate_limit.rejected", "category" => category.to_string())
                .increment(1);
            return Err(RateLimitExceeded {
                category: category.to_string(),
                retry_after_secs,
            });
        }

        state.count += 1;
        tracing::debug!(
            category = %category,
            count = state.count,
            max = policy.max_requests,
            "Rate limit admitted"
        );
        metrics::counter!("rate_limit.admitted", "category" => category.to_string())
            .increment(1);
        Ok(())
    }

    /// Requests left in the active window, without touching any state.
    ///
    /// A window that has rolled over reports the full quota. Returns `None`
    /// for categories with no policy.
    pub fn remaining(&self, category: &str) -> Option<u32> {
        let policy = self.policies.get(category)?;
        let windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let remaining = match windows.get(category) {
            Some(state) if Instant::now() <= state.reset_at => {
                policy.max_requests.saturating_sub(state.count)
            }
            _ => policy.max_requests,
        };
        Some(remaining)
    }

    /// Clear the window of one category, or of all categories.
    pub fn reset(&self, category: Option<&str>) {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match category {
            Some(category) => {
                windows.remove(category);
                tracing::info!(category = %category, "Rate limit reset");
            }
            None => {
                windows.clear();
                tracing::info!("All rate limits reset");
            }
        }
    }

    /// Names of all configured categories, sorted.
    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(BTreeMap::from([
            ("x".to_string(), RateLimitPolicy::new(5, 60_000)),
            ("finance".to_string(), RateLimitPolicy::new(5, 60_000)),
            ("weather".to_string(), RateLimitPolicy::new(100, 60_000)),
        ]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_rejects_then_rolls_over() {
        let limiter = limiter();

        for _ in 0..5 {
            limiter.check("x").unwrap();
        }

        let err = limiter.check("x").unwrap_err();
        assert_eq!(err.category, "x");
        assert!(err.retry_after_secs <= 60);
        assert!(err.retry_after_secs > 0);
        assert!(err.to_string().contains("60 seconds"));

        tokio::time::advance(Duration::from_millis(60_001)).await;
        limiter.check("x").unwrap();
        assert_eq!(limiter.remaining("x"), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_time_rounds_up() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.check("x").unwrap();
        }

        tokio::time::advance(Duration::from_millis(58_500)).await;
        let err = limiter.check("x").unwrap_err();
        assert_eq!(err.retry_after_secs, 2);
    }

    #[test]
    fn test_rejection_does_not_consume_quota() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.check("x").unwrap();
        }
        for _ in 0..3 {
            assert!(limiter.check("x").is_err());
        }
        assert_eq!(limiter.remaining("x"), Some(0));
    }

    #[test]
    fn test_categories_are_independent() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.check("finance").unwrap();
        }
        assert!(limiter.check("finance").is_err());

        limiter.check("weather").unwrap();
        assert_eq!(limiter.remaining("weather"), Some(99));
    }

    #[test]
    fn test_unknown_category_is_unbounded() {
        let limiter = limiter();
        for _ in 0..1000 {
            limiter.check("crypto").unwrap();
        }
        assert_eq!(limiter.remaining("crypto"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_is_read_only_projection() {
        let limiter = limiter();
        assert_eq!(limiter.remaining("x"), Some(5));

        limiter.check("x").unwrap();
        limiter.check("x").unwrap();
        assert_eq!(limiter.remaining("x"), Some(3));

        // Rolled-over window reports full quota before any check resets it.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.remaining("x"), Some(5));
        assert_eq!(limiter.remaining("x"), Some(5));
    }

    #[test]
    fn test_reset_one_or_all() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.check("x").unwrap();
            limiter.check("finance").unwrap();
        }

        limiter.reset(Some("x"));
        assert_eq!(limiter.remaining("x"), Some(5));
        assert_eq!(limiter.remaining("finance"), Some(0));

        limiter.reset(None);
        assert_eq!(limiter.remaining("finance"), Some(5));
    }

    #[test]
    fn test_categories_sorted() {
        assert_eq!(limiter().categories(), vec!["finance", "weather", "x"]);
    }
}
