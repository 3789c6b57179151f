/// Patrol-point management endpoints (admin console)
use crate::{
    auth::AdminAuth,
    context::AppContext,
    directory::{PointCreateRequest, PointItem, PointQr, PointUpdateRequest},
    error::PatrolResult,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/patrol/points", get(list_points).post(create_point))
        .route("/api/patrol/points/:id", patch(update_point))
        .route("/api/patrol/points/:public_id/qr", get(point_qr))
}

#[derive(Debug, Default, Deserialize)]
struct ListPointsParams {
    #[serde(default)]
    include_inactive: bool,
}

/// GET /api/patrol/points
async fn list_points(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Query(params): Query<ListPointsParams>,
) -> PatrolResult<Json<Vec<PointItem>>> {
    let points = ctx.point_directory.list(params.include_inactive).await?;
    Ok(Json(points))
}

/// POST /api/patrol/points
async fn create_point(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Json(req): Json<PointCreateRequest>,
) -> PatrolResult<Json<PointItem>> {
    let point = ctx.point_directory.create(req).await?;
    Ok(Json(point))
}

/// PATCH /api/patrol/points/{id}
async fn update_point(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(id): Path<i64>,
    Json(req): Json<PointUpdateRequest>,
) -> PatrolResult<Json<PointItem>> {
    let point = ctx.point_directory.update(id, req).await?;
    Ok(Json(point))
}

/// GET /api/patrol/points/{public_id}/qr
async fn point_qr(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(public_id): Path<String>,
) -> PatrolResult<Json<PointQr>> {
    let qr = ctx.point_directory.qr(&public_id).await?;
    Ok(Json(qr))
}
