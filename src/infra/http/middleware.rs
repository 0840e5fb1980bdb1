use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use time::OffsetDateTime;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::application::rate_limit::{RateLimitDecision, RateLimiter};

use super::error::ApiError;

/// Rate-limit action recorded for view increments.
pub const VIEW_ACTION: &str = "view";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Resolved caller address used as the rate-limit identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIp(pub String);

#[derive(Clone)]
pub struct ViewThrottle {
    pub limiter: RateLimiter,
    pub trust_forwarded_for: bool,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let client_ip = response
        .extensions()
        .get::<ClientIp>()
        .map(|ip| ip.0.clone())
        .unwrap_or_default();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "atelier::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                client_ip = client_ip,
                "request failed",
            );
        } else {
            warn!(
                target = "atelier::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                client_ip = client_ip,
                "client request error",
            );
        }
    }

    response
}

/// Sliding-window throttle in front of the view-increment routes.
pub async fn throttle_views(
    State(throttle): State<ViewThrottle>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer, throttle.trust_forwarded_for);

    let mut response = match throttle.limiter.attempt(&ip, VIEW_ACTION) {
        RateLimitDecision::Allowed { remaining } => {
            debug!(
                target = "atelier::http::throttle",
                client_ip = %ip,
                remaining,
                "View attempt allowed"
            );
            request.extensions_mut().insert(ClientIp(ip.clone()));
            next.run(request).await
        }
        RateLimitDecision::Limited { retry_after } => {
            ApiError::rate_limited(retry_after_secs(retry_after, throttle.limiter.now()))
        }
    };
    response.extensions_mut().insert(ClientIp(ip));
    response
}

/// Caller address: the first `X-Forwarded-For` hop when trusted, then the
/// socket peer, then `"unknown"`.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for
        && let Some(forwarded) = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    {
        return forwarded.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Whether the visitor cookie should carry `Secure`. `X-Forwarded-Proto` only
/// counts when forwarded headers are trusted.
pub fn is_secure_request(headers: &HeaderMap, scheme: Option<&str>, trust_forwarded: bool) -> bool {
    if scheme == Some("https") {
        return true;
    }
    if !trust_forwarded {
        return false;
    }
    headers
        .get(FORWARDED_PROTO_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Whole seconds until `retry_after`, never less than one.
fn retry_after_secs(retry_after: OffsetDateTime, now: OffsetDateTime) -> u64 {
    let remaining = (retry_after - now).as_seconds_f64().ceil();
    if remaining < 1.0 { 1 } else { remaining as u64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use time::{Duration, macros::datetime};

    #[test]
    fn forwarded_for_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer: SocketAddr = "10.0.0.1:55000".parse().expect("addr");

        assert_eq!(client_ip(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(client_ip(&headers, Some(peer), false), "10.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), None, true), "unknown");
    }

    #[test]
    fn forwarded_proto_marks_secure_only_when_trusted() {
        let mut headers = HeaderMap::new();
        assert!(!is_secure_request(&headers, None, true));
        assert!(is_secure_request(&headers, Some("https"), false));
        headers.insert(FORWARDED_PROTO_HEADER, HeaderValue::from_static("HTTPS"));
        assert!(is_secure_request(&headers, None, true));
        assert!(!is_secure_request(&headers, None, false));
    }

    #[test]
    fn retry_after_rounds_up() {
        let now = datetime!(2026-03-01 12:00:00 UTC);
        assert_eq!(retry_after_secs(now + Duration::milliseconds(55_200), now), 56);
        assert_eq!(retry_after_secs(now - Duration::seconds(3), now), 1);
    }
}
