//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use citeweave_common::config::RateLimitConfig;
use citeweave_common::errors::AppError;
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Global limiter plus the configured rate, for error reporting
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

impl RateLimit {
    /// Zero values are raised to one request per second
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(per_second);

        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst))),
            requests_per_second: per_second.get(),
        }
    }

    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limit): State<RateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if limit.check() {
        return Ok(next.run(request).await);
    }

    tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
    Err(AppError::RateLimited {
        limit: limit.requests_per_second,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(requests_per_second: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second,
            burst,
            enabled: true,
        }
    }

    #[test]
    fn test_burst_exhausted() {
        let limit = RateLimit::new(&config(1, 2));
        assert!(limit.check());
        assert!(limit.check());
        assert!(!limit.check());
    }

    #[test]
    fn test_zero_settings_still_admit() {
        let limit = RateLimit::new(&config(0, 0));
        assert_eq!(limit.requests_per_second, 1);
        assert!(limit.check());
    }
}
