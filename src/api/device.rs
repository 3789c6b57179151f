/// Permanent-device endpoints
use crate::{
    api::middleware::client_ip,
    binding::{
        BindResponse, DeviceBindRequest, DeviceLoginRequest, DeviceStatus, PermanentQrIssued,
        UnbindRequest, UnbindResponse,
    },
    context::AppContext,
    error::PatrolResult,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/patrol/device/permanent-qr", post(issue_permanent_qr))
        .route("/api/patrol/device/:device_public_id", get(device_status))
        .route("/api/patrol/device/:device_public_id/bind", post(bind))
        .route("/api/patrol/device/:device_public_id/login", post(login))
        .route("/api/patrol/device/:device_public_id/unbind", post(unbind))
}

/// POST /api/patrol/device/permanent-qr
///
/// Mints a permanent device identifier; the returned QR payload is printed
/// once and stays valid forever.
async fn issue_permanent_qr(
    State(ctx): State<AppContext>,
) -> PatrolResult<Json<PermanentQrIssued>> {
    let device = ctx.device_registry.register().await?;
    let qr_url = ctx.config.permanent_bind_url(&device.device_public_id);
    Ok(Json(PermanentQrIssued {
        device_public_id: device.device_public_id,
        qr_value: qr_url.clone(),
        qr_url,
        status: "permanent".to_string(),
    }))
}

/// GET /api/patrol/device/{device_public_id}
async fn device_status(
    State(ctx): State<AppContext>,
    Path(device_public_id): Path<String>,
) -> PatrolResult<Json<DeviceStatus>> {
    let status = ctx.device_registry.status(&device_public_id).await?;
    Ok(Json(status))
}

/// POST /api/patrol/device/{device_public_id}/bind
async fn bind(
    State(ctx): State<AppContext>,
    Path(device_public_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<DeviceBindRequest>,
) -> PatrolResult<Json<BindResponse>> {
    let response = ctx
        .binding_manager
        .bind_permanent(&device_public_id, req, client_ip(&headers))
        .await?;
    Ok(Json(response))
}

/// POST /api/patrol/device/{device_public_id}/login
async fn login(
    State(ctx): State<AppContext>,
    Path(device_public_id): Path<String>,
    Json(req): Json<DeviceLoginRequest>,
) -> PatrolResult<Json<BindResponse>> {
    let response = ctx
        .binding_manager
        .login_by_device(&device_public_id, req)
        .await?;
    Ok(Json(response))
}

/// POST /api/patrol/device/{device_public_id}/unbind
async fn unbind(
    State(ctx): State<AppContext>,
    Path(device_public_id): Path<String>,
    Json(req): Json<UnbindRequest>,
) -> PatrolResult<Json<UnbindResponse>> {
    let response = ctx
        .binding_manager
        .unbind_by_device(&device_public_id, req)
        .await?;
    Ok(Json(response))
}
