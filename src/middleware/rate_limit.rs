//! In-memory fixed-window rate limiting for login, registration and the
//! contact form.
//!
//! Counters live in this process only, so limits are per instance.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{error::AppError, state::AppState};

struct Window {
    count: u32,
    started: Instant,
    length: Duration,
}

impl Window {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.length
    }
}

#[derive(Clone, Default)]
pub struct RateLimiter {
    /// route name -> (client key -> window)
    inner: Arc<Mutex<HashMap<&'static str, HashMap<String, Window>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the request is allowed.
    pub async fn check(&self, route: &'static str, key: &str, max: u32, window: Duration) -> bool {
        let mut map = self.inner.lock().await;
        let route_map = map.entry(route).or_default();
        let now = Instant::now();

        let entry = route_map.entry(key.to_owned()).or_insert_with(|| Window {
            count: 0,
            started: now,
            length: window,
        });

        if entry.expired(now) {
            entry.count = 0;
            entry.started = now;
        }
        entry.length = window;

        entry.count += 1;
        entry.count <= max
    }

    /// Drop windows that have run their full length; live counters stay.
    pub async fn cleanup(&self) {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        for route_map in map.values_mut() {
            route_map.retain(|_, entry| !entry.expired(now));
        }
        map.retain(|_, route_map| !route_map.is_empty());
    }
}

/// First `X-Forwarded-For` entry, then the peer address.
pub fn client_ip(request: &Request) -> String {
    if let Some(first) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        let ip = first.trim();
        if !ip.is_empty() {
            return ip.to_owned();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn limit(
    state: &AppState,
    route: &'static str,
    max: u32,
    window: Duration,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    if !state.rate_limiter.check(route, &ip, max, window).await {
        tracing::warn!(route, ip = %ip, "rate limit exceeded");
        return AppError::TooManyRequests.into_response();
    }
    next.run(request).await
}

/// 5 requests per minute per IP.
pub async fn login_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    limit(&state, "login", 5, Duration::from_secs(60), request, next).await
}

/// 3 requests per minute per IP.
pub async fn register_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    limit(&state, "register", 3, Duration::from_secs(60), request, next).await
}

/// 3 messages per 10 minutes per IP.
pub async fn contact_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    limit(&state, "contact", 3, Duration::from_secs(600), request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn blocks_after_limit_within_window() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);
        for _ in 0..3 {
            assert!(limiter.check("register", "10.0.0.1", 3, window).await);
        }
        assert!(!limiter.check("register", "10.0.0.1", 3, window).await);
        // Other clients and routes have their own counters.
        assert!(limiter.check("register", "10.0.0.2", 3, window).await);
        assert!(limiter.check("login", "10.0.0.1", 3, window).await);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);
        assert!(limiter.check("login", "ip", 1, window).await);
        assert!(!limiter.check("login", "ip", 1, window).await);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check("login", "ip", 1, window).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_drops_stale_windows() {
        let limiter = RateLimiter::new();
        limiter.check("login", "ip", 5, Duration::from_secs(60)).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.cleanup().await;
        assert!(limiter.inner.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_contact_window_for_ten_minutes() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(600);
        for _ in 0..3 {
            assert!(limiter.check("contact", "ip", 3, window).await);
        }
        assert!(!limiter.check("contact", "ip", 3, window).await);

        // The periodic sweep runs every five minutes.
        tokio::time::advance(Duration::from_secs(301)).await;
        limiter.cleanup().await;
        assert!(!limiter.check("contact", "ip", 3, window).await);

        tokio::time::advance(Duration::from_secs(300)).await;
        limiter.cleanup().await;
        assert!(limiter.check("contact", "ip", 3, window).await);
    }

    #[test]
    fn forwarded_for_wins() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), "203.0.113.7");

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&bare), "unknown");
    }
}
