/// HTTP server setup and routing
use crate::{
    api::{
        self,
        middleware::{require_admin, require_two_step_session, resolve_caller},
    },
    context::AppContext,
    error::{GateError, GateResult},
    metrics,
};
use axum::{
    http::{header, HeaderName, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(api::middleware::ADMIN_SESSION_HEADER),
        ]);

    // Layers run outermost first: caller, then role, then two-step session
    let mut admin = api::applications::admin_routes().merge(api::audit::routes());
    if ctx.config.admin_auth.require_two_step_for_privileged {
        admin = admin.route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            require_two_step_session,
        ));
    }
    let admin = admin
        .route_layer(middleware::from_fn_with_state(ctx.clone(), require_admin))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), resolve_caller));

    let seller = api::applications::seller_routes()
        .route_layer(middleware::from_fn_with_state(ctx.clone(), resolve_caller));

    Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(api::public_routes())
        .merge(admin)
        .merge(seller)
        .with_state(ctx)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Prometheus scrape endpoint
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "Endpoint not found",
            "code": "NotFound"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> GateResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Storefront admin gate listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());
    if ctx.config.admin_auth.require_two_step_for_privileged {
        info!("   Privileged routes require a two-step admin session");
    }

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GateError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
        .map_err(|e| GateError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
