/// Binding-code and fingerprint-flow endpoints
use crate::{
    api::middleware::client_ip,
    auth::DeviceAuth,
    binding::{
        BindRequest, BindResponse, BindingCodeIssued, BoundLoginRequest, DeviceInfo,
        DeviceStatus, IssueBindingCodeRequest, UnbindRequest, UnbindResponse,
    },
    context::AppContext,
    error::{PatrolError, PatrolResult},
    fingerprint::DeviceFingerprint,
};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/patrol/binding-codes", post(issue_binding_code))
        .route("/api/patrol/bind", post(bind))
        .route("/api/patrol/bound-login", post(bound_login))
        .route("/api/patrol/unbind", post(unbind))
        .route("/api/patrol/binding-status", get(binding_status))
        .route("/api/patrol/me/device", get(me_device))
}

/// POST /api/patrol/binding-codes
async fn issue_binding_code(
    State(ctx): State<AppContext>,
    Json(req): Json<IssueBindingCodeRequest>,
) -> PatrolResult<Json<BindingCodeIssued>> {
    let ttl_minutes = req
        .expire_minutes
        .unwrap_or(ctx.config.auth.binding_code_ttl_minutes);
    let issued = ctx.code_issuer.issue(ttl_minutes).await?;

    let bind_url = ctx.config.bind_url(&issued.code);
    Ok(Json(BindingCodeIssued {
        code: issued.code,
        expires_at: issued.expires_at,
        qr_value: bind_url.clone(),
        bind_url,
    }))
}

/// POST /api/patrol/bind
async fn bind(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<BindRequest>,
) -> PatrolResult<Json<BindResponse>> {
    let response = ctx.binding_manager.bind(req, client_ip(&headers)).await?;
    Ok(Json(response))
}

/// POST /api/patrol/bound-login
async fn bound_login(
    State(ctx): State<AppContext>,
    Json(req): Json<BoundLoginRequest>,
) -> PatrolResult<Json<BindResponse>> {
    let response = ctx.binding_manager.bound_login(req).await?;
    Ok(Json(response))
}

/// POST /api/patrol/unbind
async fn unbind(
    State(ctx): State<AppContext>,
    Json(req): Json<UnbindRequest>,
) -> PatrolResult<Json<UnbindResponse>> {
    let response = ctx.binding_manager.unbind(req).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct BindingStatusParams {
    device_fingerprint: Option<String>,
}

/// GET /api/patrol/binding-status?device_fingerprint={json}
///
/// A missing fingerprint is not an error: the client simply has no binding
/// to report yet.
async fn binding_status(
    State(ctx): State<AppContext>,
    Query(params): Query<BindingStatusParams>,
) -> PatrolResult<Json<DeviceStatus>> {
    let raw = match params
        .device_fingerprint
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(raw) => raw,
        None => {
            return Ok(Json(DeviceStatus {
                is_bound: false,
                ..DeviceStatus::default()
            }))
        }
    };

    let canonical = DeviceFingerprint::canonicalize_raw(raw)
        .map_err(|_| PatrolError::Validation("device_fingerprint is not valid JSON".to_string()))?;
    let status = ctx.device_registry.status_by_fingerprint(&canonical).await?;
    Ok(Json(status))
}

/// GET /api/patrol/me/device
async fn me_device(
    State(ctx): State<AppContext>,
    auth: DeviceAuth,
) -> PatrolResult<Json<DeviceInfo>> {
    let info = ctx.binding_manager.device_info(&auth.device).await?;
    Ok(Json(info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_fingerprint, test_context};

    #[tokio::test]
    async fn test_binding_status_without_fingerprint_reports_unbound() {
        let ctx = test_context().await;

        let Json(status) = binding_status(
            State(ctx),
            Query(BindingStatusParams {
                device_fingerprint: None,
            }),
        )
        .await
        .unwrap();

        assert!(!status.is_bound);
        assert!(status.employee_name.is_none());
    }

    #[tokio::test]
    async fn test_binding_status_with_fingerprint_reflects_binding() {
        let ctx = test_context().await;

        let issued = ctx.code_issuer.issue(10).await.unwrap();
        ctx.binding_manager
            .bind(
                BindRequest {
                    code: issued.code,
                    employee_name: "王小明".to_string(),
                    password: "pass1".to_string(),
                    site_name: "A棟".to_string(),
                    device_fingerprint: sample_fingerprint(),
                },
                None,
            )
            .await
            .unwrap();

        let raw = serde_json::to_string(&sample_fingerprint()).unwrap();
        let Json(status) = binding_status(
            State(ctx),
            Query(BindingStatusParams {
                device_fingerprint: Some(raw),
            }),
        )
        .await
        .unwrap();

        assert!(status.is_bound);
        assert_eq!(status.employee_name.as_deref(), Some("王小明"));
    }
}
