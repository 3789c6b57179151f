/// Authentication extractors and utilities
use crate::{
    api::middleware::{extract_bearer_token, extract_device_token},
    binding::ValidatedDevice,
    context::AppContext,
    error::{PatrolError, PatrolResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

/// Authenticated device context, extracted and validated from the request
#[derive(Debug, Clone)]
pub struct DeviceAuth {
    pub device: ValidatedDevice,
}

#[async_trait]
impl FromRequestParts<AppContext> for DeviceAuth {
    type Rejection = PatrolError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_device_token(&parts.headers).ok_or_else(|| {
            PatrolError::InvalidCredential(
                "Device token required, complete binding first".to_string(),
            )
        })?;

        let device = state.token_authority.validate(&token).await?;

        Ok(DeviceAuth { device })
    }
}

/// Claims carried by an admin console JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub scope: String,
    pub exp: i64,
}

/// Admin authentication context for the binding console endpoints
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub claims: AdminClaims,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuth {
    type Rejection = PatrolError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| PatrolError::Jwt("Missing authorization header".to_string()))?;

        let claims = verify_admin_token(&token, &state.config.auth.admin_jwt_secret)?;

        Ok(AdminAuth { claims })
    }
}

/// Verify and decode an admin JWT (HS256).
///
/// Admin session issuance lives in the pre-existing console; this service
/// only verifies.
pub fn verify_admin_token(token: &str, secret: &str) -> PatrolResult<AdminClaims> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew between the console and this service
    validation.leeway = 300;

    let data = decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| PatrolError::Jwt(format!("Invalid admin token: {}", e)))?;

    if data.claims.scope != "admin" {
        return Err(PatrolError::Jwt(
            "Token does not have admin scope".to_string(),
        ));
    }

    Ok(data.claims)
}
