//! Inbound rate limiting

use super::response::error_response;
use super::state::AppState;
use crate::config::RealIpMethod;
use crate::ratelimit::RateDecision;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::warn;

const LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Identify the caller the way the deployment is configured to
pub fn client_key(method: RealIpMethod, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let from_header = match method {
        RealIpMethod::XForwardedFor => headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string()),
        RealIpMethod::XRealIp => headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string()),
        RealIpMethod::Connection => None,
    };

    from_header
        .filter(|ip| !ip.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn set_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(LIMIT, HeaderValue::from(decision.limit));
    headers.insert(REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RESET, HeaderValue::from(decision.reset_at));
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(limiter) = state.limiter.clone() else {
        return next.run(request).await;
    };
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(state.settings.server.real_ip_method, request.headers(), peer);
    let decision = limiter.check(&key).await;

    if !decision.allowed {
        warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
        let mut response = error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            format!("too many requests, retry in {}s", decision.retry_after()),
        );
        set_headers(response.headers_mut(), &decision);
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(decision.retry_after()));
        return response;
    }

    let mut response = next.run(request).await;
    set_headers(response.headers_mut(), &decision);
    response
}
