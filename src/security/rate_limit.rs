//! Fixed-window rate limiting.
//!
//! Each key gets a window that starts on its first request. Up to `limit`
//! requests are admitted until the window has been open for `window`; the
//! next request after that opens a fresh window with a zero count.
//!
//! The same limiter backs the HTTP middleware (keyed by client IP) and the
//! resilient client (keyed by caller).

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::RateLimitConfig;
use crate::observability::metrics;

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes.
    pub reset_after: Duration,
}

impl RateDecision {
    /// Whole seconds until reset, rounded up.
    pub fn reset_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset_secs()));
    }
}

#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<String, Window>,
    limit: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject one call for `key`.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        // Entry lock makes check-and-increment atomic per key.
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        let window = entry.value_mut();

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        let allowed = window.count < self.limit;
        if allowed {
            window.count += 1;
        }

        RateDecision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(window.count),
            reset_after: self.window.saturating_sub(now.duration_since(window.started)),
        }
    }

    /// Drop windows that have already closed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.duration_since(window.started) < self.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Periodically purge closed windows until shutdown.
    pub async fn run_purger(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let interval = interval.max(Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Purged closed rate-limit windows");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate-limit purger stopping");
                    return;
                }
            }
        }
    }
}

/// Middleware limiting requests per client IP.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let decision = limiter.check(&key);
    if decision.allowed {
        let mut response = next.run(request).await;
        decision.apply_headers(response.headers_mut());
        return response;
    }

    tracing::warn!(client = %key, limit = decision.limit, "Rate limit exceeded");
    metrics::record_rate_limited("http");

    let body = Json(serde_json::json!({
        "error": "Too many requests, please try again later."
    }));
    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    decision.apply_headers(response.headers_mut());
    response
        .headers_mut()
        .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(decision.reset_secs()));
    response
}
