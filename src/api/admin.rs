/// Admin binding console endpoints
///
/// Admin session issuance lives in the pre-existing console; these routes
/// only verify its JWTs.
use crate::{
    auth::AdminAuth,
    binding::{
        AdminPasswordResetRequest, BindingAdminItem, BindingAdminListResponse,
        BindingSearchParams, UnbindResponse,
    },
    context::AppContext,
    error::PatrolResult,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/patrol/device-bindings", get(list_bindings))
        .route(
            "/api/patrol/device-bindings/:id/password",
            patch(reset_password),
        )
        .route("/api/patrol/device-bindings/:id/unbind", post(unbind))
}

/// GET /api/patrol/device-bindings
async fn list_bindings(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Query(params): Query<BindingSearchParams>,
) -> PatrolResult<Json<BindingAdminListResponse>> {
    let response = ctx.binding_manager.list_bindings(params).await?;
    Ok(Json(response))
}

/// PATCH /api/patrol/device-bindings/{id}/password
async fn reset_password(
    State(ctx): State<AppContext>,
    auth: AdminAuth,
    Path(id): Path<i64>,
    Json(req): Json<AdminPasswordResetRequest>,
) -> PatrolResult<Json<BindingAdminItem>> {
    tracing::info!("Admin {} resetting password for binding {}", auth.claims.sub, id);
    let item = ctx
        .binding_manager
        .admin_reset_password(id, &req.password)
        .await?;
    Ok(Json(item))
}

/// POST /api/patrol/device-bindings/{id}/unbind
async fn unbind(
    State(ctx): State<AppContext>,
    auth: AdminAuth,
    Path(id): Path<i64>,
) -> PatrolResult<Json<UnbindResponse>> {
    tracing::info!("Admin {} unbinding binding {}", auth.claims.sub, id);
    let response = ctx.binding_manager.admin_unbind(id).await?;
    Ok(Json(response))
}
