/// API routes and handlers
pub mod admin;
pub mod binding;
pub mod checkin;
pub mod device;
pub mod middleware;
pub mod points;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(binding::routes())
        .merge(device::routes())
        .merge(points::routes())
        .merge(checkin::routes())
        .merge(admin::routes())
}
