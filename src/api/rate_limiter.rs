//! Per-member request rate limiting for the REST API

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as KeyedLimiter};
use std::num::NonZeroU32;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::api::dto::ErrorResponse;
use crate::auth::MEMBER_HEADER;

/// Keyed limiter: one bucket per member, or per client address for
/// requests that do not name a member.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(KeyedLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }

    pub fn check(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    /// Drops buckets that have fully refilled (call periodically)
    pub fn cleanup_expired(&self) {
        self.limiter.retain_recent();
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }

    /// Prunes refilled buckets every `period` until the limiter is dropped.
    /// Does nothing outside a Tokio runtime.
    pub fn spawn_cleanup(&self, period: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let weak: Weak<DefaultKeyedRateLimiter<String>> = Arc::downgrade(&self.limiter);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    break;
                };
                limiter.retain_recent();
                limiter.shrink_to_fit();
                debug!(tracked = limiter.len(), "Pruned rate limit buckets");
            }
        });
    }
}

fn rate_limit_key(request: &Request) -> String {
    let headers = request.headers();
    // Unparseable member ids fall through to the address key so rotating
    // garbage values cannot mint fresh buckets.
    if let Some(member) = headers
        .get(MEMBER_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
    {
        return format!("member:{}", member);
    }

    let ip = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .unwrap_or("local");
    format!("ip:{}", ip)
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let key = rate_limit_key(&request);

    if limiter.check(&key) {
        next.run(request).await
    } else {
        tracing::warn!(key = %key, "Rate limit exceeded");
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::new(
                "Rate limit exceeded. Please try again later.",
                "rateLimited",
            )),
        )
            .into_response()
    }
}
