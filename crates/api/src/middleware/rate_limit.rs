//! Per-client request rate limiting.
//!
//! Clients are identified by the first proxy header present
//! (`cf-connecting-ip`, `x-forwarded-for`, `x-real-ip`). Requests from clients
//! without any of them share the `unknown` bucket. Disabled in development.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::{error::error_response, state::AppState};

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Identify the client behind any proxies.
pub fn client_key(headers: &HeaderMap) -> String {
    header(headers, "cf-connecting-ip")
        .or_else(|| {
            header(headers, "x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .or_else(|| header(headers, "x-real-ip"))
        .unwrap_or("unknown")
        .to_string()
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.config.is_development() {
        return next.run(req).await;
    }

    let limit = state.config.rate_limit_requests;
    let key = format!("ratelimit:ip:{}", client_key(req.headers()));

    let result = match state
        .stores
        .rate_limiter
        .check_simple(&key, limit, state.config.rate_limit_window_secs)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(key = %key, "rate limiter unavailable: {:?}", e);
            return next.run(req).await;
        }
    };

    let remaining = (limit - result.count()).max(0);

    let mut response = if result.is_allowed() {
        next.run(req).await
    } else {
        tracing::warn!(key = %key, count = result.count(), "rate limit exceeded");
        error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Try again later.",
        )
    };

    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));

    response
}
