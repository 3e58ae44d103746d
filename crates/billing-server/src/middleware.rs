//! Request Middleware
//!
//! Request ids for every response, plus the webhook guard (per-IP rate
//! limit and optional source allowlist).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id assigned to the current request
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Tag every response with a fresh `X-Request-Id` and echo it in error bodies
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;

    if let Some(mut body) = response.extensions_mut().remove::<ErrorBody>() {
        body.request_id = Some(id.clone());
        let status = response.status();
        response = (status, Json(body)).into_response();
    }

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Fixed-window request counter keyed by source address
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, (Instant, u32)>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: DashMap::new(),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Count a hit for `key`; false once the window's budget is spent
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert((now, 0));
        let (started, count) = entry.value_mut();

        if now.duration_since(*started) >= self.window {
            *started = now;
            *count = 0;
        }

        if *count >= self.limit {
            return false;
        }
        *count += 1;
        true
    }

    /// Drop windows that have already expired
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, (started, _)| now.duration_since(*started) < self.window);
    }
}

/// Periodically evict expired rate-limit windows
pub fn start_cleanup_task(limiter: Arc<RateLimiter>, interval: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            limiter.cleanup();
        }
    });
}

/// Source address.
///
/// The socket peer, unless `trust_proxy` is set: then the last
/// `X-Forwarded-For` entry, the one appended by the fronting proxy.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Option<IpAddr> {
    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').next())
            .and_then(|last| last.trim().parse::<IpAddr>().ok())
    };

    if trust_proxy {
        forwarded().or_else(|| peer.map(|p| p.ip()))
    } else {
        peer.map(|p| p.ip())
    }
}

/// Rate limit and allowlist check for the provider webhook
pub async fn webhook_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer, state.config.trust_proxy);
    let key = ip.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());

    if !state.webhook_limiter.check(&key) {
        tracing::warn!(source = %key, "Webhook rate limit exceeded");
        return ApiError::rate_limited().into_response();
    }

    let allowlist = &state.config.ip_allowlist;
    if !allowlist.is_empty() && !ip.is_some_and(|ip| allowlist.contains(&ip)) {
        tracing::warn!(source = %key, "Webhook from address outside allowlist");
        return ApiError::forbidden("Source address not allowed").into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        // Separate budget per source
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn test_rate_limiter_resets() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
    }

    #[test]
    fn test_rate_limiter_cleanup() {
        let limiter = RateLimiter::new(5, Duration::from_millis(20));
        for i in 0..100 {
            assert!(limiter.check(&format!("10.0.0.{i}")));
        }
        assert_eq!(limiter.windows.len(), 100);

        // Live windows survive a sweep
        limiter.cleanup();
        assert_eq!(limiter.windows.len(), 100);

        std::thread::sleep(Duration::from_millis(30));
        limiter.cleanup();
        assert!(limiter.windows.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_task_evicts() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_millis(10)));
        limiter.check("a");
        start_cleanup_task(limiter.clone(), Duration::from_millis(15));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.windows.is_empty());
    }

    #[test]
    fn test_client_ip() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.0.9:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer), false), Some("192.168.0.9".parse().unwrap()));

        // Forwarded header ignored unless a proxy is trusted
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.1.1.1, 172.16.0.1"));
        assert_eq!(client_ip(&headers, Some(peer), false), Some("192.168.0.9".parse().unwrap()));
        assert_eq!(client_ip(&headers, None, false), None);

        // Behind a proxy, the entry it appended wins over client-supplied ones
        assert_eq!(client_ip(&headers, Some(peer), true), Some("172.16.0.1".parse().unwrap()));
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer), true), Some("192.168.0.9".parse().unwrap()));
        assert_eq!(client_ip(&HeaderMap::new(), None, true), None);
    }
}
