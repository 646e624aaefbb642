/// Authentication and authorization middleware
///
/// Three independent layers, applied innermost last:
/// `resolve_caller` (bearer credential), `require_admin` (privilege gate) and
/// `require_two_step_session` (fully authenticated admin session).
use crate::{
    account::CallerIdentity,
    admin::Role,
    auth_gate::RequestSource,
    context::AppContext,
    error::GateError,
};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

/// Header carrying the two-step admin session token
pub const ADMIN_SESSION_HEADER: &str = "x-admin-session";

const UNKNOWN: &str = "unknown";

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Extract the two-step session token header
pub fn extract_admin_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ADMIN_SESSION_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Client address and agent of a request
///
/// `x-forwarded-for` is only honoured when the service sits behind a trusted
/// proxy; otherwise the socket peer address is used.
pub fn client_source(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> RequestSource {
    let forwarded = headers
        .get("x-forwarded-for")
        .filter(|_| trust_proxy_headers)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let ip = forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .unwrap_or(UNKNOWN);

    RequestSource::new(ip, Some(user_agent.to_string()))
}

/// Resolve the bearer credential into a `CallerIdentity` extension, or 401
pub async fn resolve_caller(
    State(ctx): State<AppContext>,
    mut req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let token = extract_bearer_token(req.headers())
        .ok_or_else(|| GateError::Unauthorized("Missing authorization header".to_string()))?;

    let caller = ctx.tokens.resolve(&token).await?;
    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}

/// Require the resolved caller to hold the admin role, or 403
pub async fn require_admin(
    State(ctx): State<AppContext>,
    req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let caller = req
        .extensions()
        .get::<CallerIdentity>()
        .cloned()
        .ok_or_else(|| GateError::Unauthorized("Caller not resolved".to_string()))?;

    ctx.gate.require(&caller, Role::Admin).await?;

    Ok(next.run(req).await)
}

/// Require a fully authenticated two-step session in `x-admin-session`, or 401
pub async fn require_two_step_session(
    State(ctx): State<AppContext>,
    req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let token = extract_admin_session(req.headers()).ok_or(GateError::InvalidSession)?;

    if ctx.sessions.load_authenticated(&token).await?.is_none() {
        tracing::debug!("privileged request without an authenticated admin session");
        return Err(GateError::InvalidSession);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_client_source() {
        let mut headers = HeaderMap::new();
        let source = client_source(&headers, None, true);
        assert_eq!(source.ip, "unknown");
        assert_eq!(source.user_agent.as_deref(), Some("unknown"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("user-agent", HeaderValue::from_static("curl/8"));
        let source = client_source(&headers, None, true);
        assert_eq!(source.ip, "203.0.113.7");
        assert_eq!(source.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn test_forwarded_for_ignored_without_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let peer: SocketAddr = "192.0.2.10:51000".parse().unwrap();

        assert_eq!(client_source(&headers, Some(peer), false).ip, "192.0.2.10");
        assert_eq!(client_source(&headers, None, false).ip, "unknown");
        assert_eq!(client_source(&headers, Some(peer), true).ip, "203.0.113.7");

        headers.remove("x-forwarded-for");
        assert_eq!(client_source(&headers, Some(peer), true).ip, "192.0.2.10");
    }
}
