//! The middleware chain: CORS, auth, access logging, and rate limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::http::{Request, Response, StatusCode};

/// A middleware receives the request (read-only) and response (mutable)
/// and returns `true` to continue the chain or `false` to short-circuit.
pub type Middleware = std::sync::Arc<dyn Fn(&Request, &mut Response) -> bool + Send + Sync>;

/// Runs `middlewares` in order against `request`/`response`, stopping at
/// the first one that returns `false`. Returns whether the chain ran to
/// completion.
pub fn run_chain(middlewares: &[Middleware], request: &Request, response: &mut Response) -> bool {
    for middleware in middlewares {
        if !middleware(request, response) {
            return false;
        }
    }
    true
}

/// Configuration for the CORS middleware.
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
            expose_headers: String::new(),
            allow_credentials: false,
            max_age_seconds: 86400,
        }
    }
}

/// Builds a CORS middleware that inspects `Origin`, writes the standard
/// `Access-Control-*` headers, and short-circuits `OPTIONS` preflight
/// requests with `204 No Content`.
pub fn cors(config: CorsConfig) -> Middleware {
    std::sync::Arc::new(move |request, response| {
        if request.header("origin").is_some() {
            response.set_header("Access-Control-Allow-Origin", config.allow_origin.clone());
            response.set_header("Access-Control-Allow-Methods", config.allow_methods.clone());
            response.set_header("Access-Control-Allow-Headers", config.allow_headers.clone());
            if !config.expose_headers.is_empty() {
                response.set_header("Access-Control-Expose-Headers", config.expose_headers.clone());
            }
            if config.allow_credentials {
                response.set_header("Access-Control-Allow-Credentials", "true");
            }
        }

        if request.method == crate::http::Method::Options {
            response.set_header("Access-Control-Max-Age", config.max_age_seconds.to_string());
            response.set_status(StatusCode::NoContent);
            response.set_body(Vec::new());
            return false;
        }

        true
    })
}

/// Extracts the bearer credential from `Authorization`, supporting both
/// the `Bearer <token>` prefix and a raw token value.
fn extract_bearer(request: &Request) -> Option<&str> {
    let value = request.header("authorization")?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

/// Builds an auth middleware that delegates token validity to
/// `validator`, writing a `401` JSON error and short-circuiting on
/// failure.
pub fn auth(validator: impl Fn(&str) -> bool + Send + Sync + 'static) -> Middleware {
    std::sync::Arc::new(move |request, response| match extract_bearer(request) {
        Some(token) if validator(token) => true,
        _ => {
            response.set_status(StatusCode::Unauthorized);
            response.json("{\"error\":\"unauthorized\"}");
            false
        }
    })
}

/// Builds a logging middleware that records one structured line per
/// request via the `log` facade.
pub fn logging() -> Middleware {
    std::sync::Arc::new(|request, _response| {
        log::info!(
            "{} {} {}{} {} \"{}\"",
            request.client_ip,
            request.method,
            request.path,
            if request.query_string.is_empty() {
                String::new()
            } else {
                format!("?{}", request.query_string)
            },
            request.version,
            request.header("user-agent").unwrap_or("-"),
        );
        true
    })
}

struct RateLimitEntry {
    count: u32,
    window_start: u64,
}

/// Builds a rate-limit middleware keyed by the client's IP address or
/// by their `Authorization` header value. Exceeding `max_requests`
/// within `window_seconds` writes `429` with `X-RateLimit-*` headers
/// and short-circuits. The shared counter map is mutex-protected;
/// entries older than `2 * window_seconds` are evicted lazily.
pub fn rate_limit(max_requests: u32, window_seconds: u64, key_by_auth_header: bool) -> Middleware {
    let state: Mutex<HashMap<String, RateLimitEntry>> = Mutex::new(HashMap::new());

    std::sync::Arc::new(move |request, response| {
        let key = if key_by_auth_header {
            request
                .header("authorization")
                .unwrap_or("")
                .to_string()
        } else {
            request.client_ip.clone()
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut state = state.lock().expect("rate limit mutex not poisoned");
        state.retain(|_, entry| now.saturating_sub(entry.window_start) < 2 * window_seconds);

        let entry = state.entry(key).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        if now.saturating_sub(entry.window_start) >= window_seconds {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        let remaining = max_requests.saturating_sub(entry.count);
        let reset = entry.window_start + window_seconds;

        response.set_header("X-RateLimit-Limit", max_requests.to_string());
        response.set_header("X-RateLimit-Remaining", remaining.to_string());
        response.set_header("X-RateLimit-Reset", reset.to_string());

        if entry.count > max_requests {
            response.set_status(StatusCode::TooManyRequests);
            response.set_header("X-RateLimit-Remaining", "0");
            response.json("{\"error\":\"rate limit exceeded\"}");
            return false;
        }

        true
    })
}
