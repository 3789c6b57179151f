/// Device token authority
///
/// Issues and validates opaque bearer tokens scoped to one binding. Tokens
/// carry no claims a client could forge; validity is re-derived from the
/// binding row on every use, so unbinding revokes every outstanding token
/// with no grace period.
use crate::error::{PatrolError, PatrolResult};
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sqlx::{FromRow, SqlitePool};

#[derive(Clone)]
pub struct TokenAuthority {
    db: SqlitePool,
}

/// Binding identity resolved from a valid device token
#[derive(Debug, Clone, FromRow)]
pub struct ValidatedDevice {
    pub binding_id: i64,
    pub device_public_id: String,
    pub employee_name: String,
    pub site_name: String,
    pub bound_at: DateTime<Utc>,
    pub fingerprint_json: Option<String>,
}

impl TokenAuthority {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Generate an opaque random token
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 48];
        rand::thread_rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Issue a token for a binding inside an ongoing transaction
    pub async fn issue(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        binding_id: i64,
    ) -> PatrolResult<String> {
        let token = Self::generate_token();

        sqlx::query(
            r#"
            INSERT INTO device_tokens (token, binding_id, issued_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&token)
        .bind(binding_id)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(token)
    }

    /// Issue a token for a binding outside a transaction
    pub async fn issue_standalone(&self, binding_id: i64) -> PatrolResult<String> {
        let mut tx = self.db.begin().await?;
        let token = self.issue(&mut tx, binding_id).await?;
        tx.commit().await?;
        Ok(token)
    }

    /// Validate a token.
    ///
    /// The join re-checks `is_active` on every call; a token for an unbound
    /// binding is rejected even if the token row still exists.
    pub async fn validate(&self, token: &str) -> PatrolResult<ValidatedDevice> {
        let token = token.trim();
        if token.is_empty() {
            return Err(PatrolError::InvalidCredential(
                "Device token required, complete binding first".to_string(),
            ));
        }

        sqlx::query_as::<_, ValidatedDevice>(
            r#"
            SELECT b.id AS binding_id, b.device_public_id, b.employee_name,
                   b.site_name, b.bound_at, b.fingerprint_json
            FROM device_tokens t
            JOIN device_bindings b ON b.id = t.binding_id
            WHERE t.token = ? AND b.is_active = 1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            PatrolError::InvalidCredential("Device token invalid, bind the device again".to_string())
        })
    }
}
