/// Health check endpoints for liveness and readiness probes
use crate::{auth_gate::Step, context::AppContext, error::GateResult};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;

/// Health status of an individual component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    /// "healthy", "degraded", or "unhealthy"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_probe))
}

/// Basic health check
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe
///
/// 503 when the database is unreachable. Missing admin secrets only degrade
/// the service, since everything but admin sign-in still works.
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> (StatusCode, Json<serde_json::Value>) {
    let checks = vec![check_database(&ctx).await, check_secrets(&ctx).await];

    let status = if checks.iter().any(|c| c.status == "unhealthy") {
        "unhealthy"
    } else if checks.iter().any(|c| c.status == "degraded") {
        "degraded"
    } else {
        "healthy"
    };

    let code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "checks": checks,
        })),
    )
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    match crate::db::test_connection(&ctx.db).await {
        Ok(()) => component("database", "healthy", None),
        Err(e) => {
            tracing::warn!(error = %e, "readiness database check failed");
            component("database", "unhealthy", Some(e.to_string()))
        }
    }
}

async fn check_secrets(ctx: &AppContext) -> ComponentHealth {
    async fn provisioned(ctx: &AppContext) -> GateResult<bool> {
        Ok(ctx.secrets.is_provisioned(Step::Step1).await?
            && ctx.secrets.is_provisioned(Step::Step2).await?)
    }

    match provisioned(ctx).await {
        Ok(true) => component("admin_secrets", "healthy", None),
        Ok(false) => component(
            "admin_secrets",
            "degraded",
            Some("admin secrets not provisioned".to_string()),
        ),
        Err(e) => component("admin_secrets", "unhealthy", Some(e.to_string())),
    }
}

fn component(name: &str, status: &str, error: Option<String>) -> ComponentHealth {
    ComponentHealth {
        name: name.to_string(),
        status: status.to_string(),
        error,
    }
}
