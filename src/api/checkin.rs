/// Check-in endpoints
use crate::{
    auth::{AdminAuth, DeviceAuth},
    checkin::{CheckinRequest, CheckinResponse, PublicCheckinRequest, RecordQuery},
    context::AppContext,
    error::PatrolResult,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/patrol/checkin", post(checkin_device))
        .route("/api/patrol/checkin/records", get(list_records))
        .route("/api/patrol/checkin/:public_id", post(checkin_public))
}

/// POST /api/patrol/checkin
///
/// Bound-device flow: the device token is the identity, the body carries
/// the scanned QR payload.
async fn checkin_device(
    State(ctx): State<AppContext>,
    auth: DeviceAuth,
    Json(req): Json<CheckinRequest>,
) -> PatrolResult<Json<CheckinResponse>> {
    let response = ctx
        .checkin_gateway
        .checkin_device(&auth.device, &req.qr_value)
        .await?;
    Ok(Json(response))
}

/// POST /api/patrol/checkin/{public_id}
///
/// Public flow: no device token, the caller names the employee.
async fn checkin_public(
    State(ctx): State<AppContext>,
    Path(public_id): Path<String>,
    Json(req): Json<PublicCheckinRequest>,
) -> PatrolResult<Json<CheckinResponse>> {
    let response = ctx.checkin_gateway.checkin_public(&public_id, req).await?;
    Ok(Json(response))
}

/// GET /api/patrol/checkin/records
async fn list_records(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Query(query): Query<RecordQuery>,
) -> PatrolResult<Json<Vec<CheckinResponse>>> {
    let records = ctx.checkin_gateway.list_records(query).await?;
    Ok(Json(records))
}
