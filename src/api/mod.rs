/// API routes and handlers
pub mod admin_auth;
pub mod applications;
pub mod audit;
pub mod health;
pub mod middleware;

use crate::context::AppContext;
use axum::Router;

/// Unguarded routes
pub fn public_routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(admin_auth::routes())
}
