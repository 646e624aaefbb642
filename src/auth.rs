/// Request extractors
use crate::{
    account::CallerIdentity, api::middleware::client_source, auth_gate::RequestSource,
    context::AppContext, error::GateError,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::net::SocketAddr;

/// Caller resolved by the `resolve_caller` layer
#[derive(Debug, Clone)]
pub struct Caller(pub CallerIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .map(Caller)
            .ok_or_else(|| GateError::Unauthorized("Authentication required".to_string()))
    }
}

/// Client address and agent of the request
#[derive(Debug, Clone)]
pub struct ClientSource(pub RequestSource);

#[async_trait]
impl FromRequestParts<AppContext> for ClientSource {
    type Rejection = GateError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientSource(client_source(
            &parts.headers,
            peer,
            ctx.config.service.trust_proxy_headers,
        )))
    }
}
