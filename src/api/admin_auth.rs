/// Two-step admin sign-in endpoints
use crate::{
    api::middleware::extract_admin_session,
    auth::ClientSource,
    auth_gate::{AuthOutcome, SessionState, SessionStatus},
    context::AppContext,
    error::{GateError, GateResult},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build two-step sign-in routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/auth/step1", post(step1))
        .route("/admin/auth/step2", post(step2))
        .route("/admin/auth/session", get(session_status))
}

#[derive(Deserialize)]
struct Step1Request {
    #[serde(default)]
    passphrase: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Step2Request {
    #[serde(default)]
    passphrase: String,
    #[serde(default)]
    session_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepResponse {
    success: bool,
    session_token: String,
    message: &'static str,
    state: SessionState,
    expires_at: DateTime<Utc>,
}

impl StepResponse {
    fn new(outcome: AuthOutcome, message: &'static str) -> Self {
        Self {
            success: true,
            session_token: outcome.session_token,
            message,
            state: outcome.state,
            expires_at: outcome.expires_at,
        }
    }
}

async fn step1(
    State(ctx): State<AppContext>,
    ClientSource(source): ClientSource,
    payload: Result<Json<Step1Request>, JsonRejection>,
) -> GateResult<Json<StepResponse>> {
    let Json(req) = payload?;
    let outcome = ctx.two_step.step1(&source, &req.passphrase).await?;
    Ok(Json(StepResponse::new(outcome, "Step 1 verified")))
}

async fn step2(
    State(ctx): State<AppContext>,
    ClientSource(source): ClientSource,
    payload: Result<Json<Step2Request>, JsonRejection>,
) -> GateResult<Json<StepResponse>> {
    let Json(req) = payload?;
    let outcome = ctx
        .two_step
        .step2(&source, req.session_token.as_deref(), &req.passphrase)
        .await?;
    Ok(Json(StepResponse::new(outcome, "Admin access granted")))
}

async fn session_status(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> GateResult<Json<SessionStatus>> {
    let token = extract_admin_session(&headers).ok_or(GateError::MissingSession)?;
    Ok(Json(ctx.two_step.session_status(&token).await?))
}
