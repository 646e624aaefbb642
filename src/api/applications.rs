/// Seller application endpoints
///
/// Review, listing and stats are admin-only; submission is open to any
/// signed-in caller. Guard layers are applied in `server::build_router`.
use crate::{
    admin::{
        ApplicationDetails, ApplicationStatus, DashboardStats, ReviewAction, ReviewRequest,
        SellerApplication,
    },
    auth::{Caller, ClientSource},
    context::AppContext,
    error::GateResult,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Admin-only routes
pub fn admin_routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/applications/review", post(review_application))
        .route("/admin/applications", get(list_applications))
        .route("/admin/stats", get(dashboard_stats))
}

/// Routes for any signed-in caller
pub fn seller_routes() -> Router<AppContext> {
    Router::new().route("/seller/applications", post(submit_application))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewApplicationRequest {
    application_id: String,
    action: String,
    #[serde(default)]
    review_notes: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewApplicationResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_slug: Option<String>,
}

async fn review_application(
    State(ctx): State<AppContext>,
    Caller(caller): Caller,
    ClientSource(source): ClientSource,
    payload: Result<Json<ReviewApplicationRequest>, JsonRejection>,
) -> GateResult<Json<ReviewApplicationResponse>> {
    let Json(req) = payload?;
    let request = ReviewRequest {
        application_id: req.application_id,
        action: ReviewAction::parse(&req.action)?,
        review_notes: req.review_notes,
    };

    let outcome = ctx.applications.review(&caller, &source, request).await?;

    Ok(Json(ReviewApplicationResponse {
        success: true,
        message: outcome.message,
        store_slug: outcome.store_slug,
    }))
}

#[derive(Deserialize)]
struct ListApplicationsQuery {
    status: Option<String>,
}

#[derive(Serialize)]
struct ListApplicationsResponse {
    applications: Vec<SellerApplication>,
}

async fn list_applications(
    State(ctx): State<AppContext>,
    Caller(caller): Caller,
    query: Result<Query<ListApplicationsQuery>, QueryRejection>,
) -> GateResult<Json<ListApplicationsResponse>> {
    let Query(query) = query?;
    let status = query
        .status
        .as_deref()
        .map(ApplicationStatus::parse)
        .transpose()?;

    let applications = ctx.applications.list(&caller, status).await?;
    Ok(Json(ListApplicationsResponse { applications }))
}

async fn dashboard_stats(
    State(ctx): State<AppContext>,
    Caller(caller): Caller,
) -> GateResult<Json<DashboardStats>> {
    Ok(Json(ctx.applications.stats(&caller).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitApplicationRequest {
    #[serde(default)]
    business_name: Option<String>,
    #[serde(default)]
    business_description: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

async fn submit_application(
    State(ctx): State<AppContext>,
    Caller(caller): Caller,
    payload: Result<Json<SubmitApplicationRequest>, JsonRejection>,
) -> GateResult<Json<SellerApplication>> {
    let Json(req) = payload?;
    let details = ApplicationDetails {
        business_name: req.business_name,
        business_description: req.business_description,
        country: req.country,
    };

    Ok(Json(ctx.applications.submit(&caller, details).await?))
}
