/// Audit log endpoint
///
/// Admin-only; guard layers are applied in `server::build_router`.
use crate::{
    audit::{AuditAction, AuditLogEntry},
    context::AppContext,
    error::{GateError, GateResult},
};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// Build audit routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/admin/audit", get(recent_entries))
}

#[derive(Deserialize)]
struct AuditQuery {
    action: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct AuditResponse {
    entries: Vec<AuditLogEntry>,
}

async fn recent_entries(
    State(ctx): State<AppContext>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> GateResult<Json<AuditResponse>> {
    let Query(query) = query?;

    let action = query
        .action
        .as_deref()
        .map(|name| {
            AuditAction::parse(name)
                .map_err(|_| GateError::Validation(format!("Unknown audit action: {}", name)))
        })
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let entries = ctx.audit.recent(action, limit).await?;
    Ok(Json(AuditResponse { entries }))
}
