//! API middleware.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderName, HeaderValue, Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn, Span};
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics;

type ClientRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Clients tracked before idle ones are evicted.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// A client unseen for this long loses its limiter state.
const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(3600);

const DEFAULT_RPS: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

struct ClientLimiter {
    limiter: ClientRateLimiter,
    last_seen: Instant,
}

/// Token bucket per client IP, bounded in size.
///
/// Each client gets its own governor limiter. Once `capacity` clients are
/// tracked, a new client first sweeps out everyone idle for `idle_ttl`,
/// then the least recently seen client if that was not enough.
#[derive(Clone)]
pub struct RateLimiterCache {
    clients: Arc<Mutex<HashMap<IpAddr, ClientLimiter>>>,
    quota: Quota,
    capacity: usize,
    idle_ttl: Duration,
}

impl RateLimiterCache {
    /// Zero requests per second falls back to 10.
    pub fn new(requests_per_second: u32) -> Self {
        Self::with_limits(requests_per_second, MAX_TRACKED_CLIENTS, DEFAULT_IDLE_TTL)
    }

    pub fn with_limits(requests_per_second: u32, capacity: usize, idle_ttl: Duration) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            quota: Quota::per_second(rps),
            capacity: capacity.max(1),
            idle_ttl,
        }
    }

    /// Spend one token for `ip`; false when its bucket is empty.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if !clients.contains_key(&ip) && clients.len() >= self.capacity {
            self.make_room(&mut clients, now);
        }

        let client = clients.entry(ip).or_insert_with(|| ClientLimiter {
            limiter: RateLimiter::direct(self.quota),
            last_seen: now,
        });
        client.last_seen = now;
        client.limiter.check().is_ok()
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn make_room(&self, clients: &mut HashMap<IpAddr, ClientLimiter>, now: Instant) {
        let before = clients.len();
        clients.retain(|_, c| now.duration_since(c.last_seen) < self.idle_ttl);

        if clients.len() >= self.capacity {
            let stalest = clients
                .iter()
                .min_by_key(|(_, c)| c.last_seen)
                .map(|(ip, _)| *ip);
            if let Some(ip) = stalest {
                clients.remove(&ip);
            }
        }

        debug!(
            evicted = before - clients.len(),
            tracked = clients.len(),
            "Rate limiter at capacity"
        );
    }
}

/// Create CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    use axum::http::{header, Method};

    let allowed_headers = [
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
        header::RANGE,
    ];

    // Range responses need these readable from the browser
    let exposed_headers = [
        header::CONTENT_LENGTH,
        header::CONTENT_TYPE,
        header::CONTENT_DISPOSITION,
        header::CONTENT_RANGE,
        header::ACCEPT_RANGES,
    ];

    let allowed_methods = [Method::GET, Method::POST, Method::OPTIONS];

    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
            .allow_origin(Any)
            .max_age(Duration::from_secs(600))
    } else {
        // tower-http panics if credentials are combined with wildcard headers
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_methods(allowed_methods)
            .allow_headers(allowed_headers)
            .expose_headers(exposed_headers)
            .allow_credentials(true)
            .allow_origin(origins)
            .max_age(Duration::from_secs(600))
    }
}

const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "permissions-policy",
        "accelerometer=(), camera=(), geolocation=(), gyroscope=(), magnetometer=(), microphone=(), payment=(), usb=()",
    ),
    ("x-permitted-cross-domain-policies", "none"),
];

/// Security headers middleware.
///
/// Headers a handler already set are left alone.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in SECURITY_HEADERS {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert(HeaderValue::from_static(value));
    }

    response
}

/// Request ID middleware.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());

    Span::current().record("request_id", &request_id);

    let mut response = next.run(request).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-ID", header_value);
    }

    response
}

/// Request logging middleware.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();

    // Skip health check noise
    if !matches!(uri.path(), "/health" | "/healthz" | "/ready" | "/metrics") {
        info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

/// Rate limiting middleware using IP-based rate limiter.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<RateLimiterCache>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if let Some(ip) = extract_client_ip(&request) {
        if !rate_limiter.check(ip) {
            warn!(ip = %ip, "Rate limit exceeded");
            metrics::record_rate_limit_hit(request.uri().path());
            return ([("Retry-After", "1")], ApiError::RateLimited).into_response();
        }
    }

    next.run(request).await
}

/// Client address for rate limiting.
///
/// Proxy headers win over the socket peer; for `X-Forwarded-For` the first
/// hop is the client. Unparsable header values are skipped.
fn extract_client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let header_ip = |name: &str| -> Option<IpAddr> {
        request
            .headers()
            .get(name)?
            .to_str()
            .ok()?
            .split(',')
            .next()?
            .trim()
            .parse()
            .ok()
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}
