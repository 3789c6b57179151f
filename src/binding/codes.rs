/// Binding code issuance and consumption
use crate::{
    db::models::PatrolDevice,
    error::{PatrolError, PatrolResult},
};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Issues short-lived, single-use codes that authorize a first-time bind
#[derive(Clone)]
pub struct BindingCodeIssuer {
    db: SqlitePool,
}

/// Result of issuing a code, before URL decoration
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl BindingCodeIssuer {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Generate an unpredictable URL-safe code
    pub fn generate_code() -> String {
        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Issue a new code with the given TTL.
    ///
    /// Each issuance is independent: outstanding unconsumed codes stay valid.
    pub async fn issue(&self, ttl_minutes: i64) -> PatrolResult<IssuedCode> {
        if ttl_minutes <= 0 {
            return Err(PatrolError::Validation(
                "Binding code TTL must be positive".to_string(),
            ));
        }

        let code = Self::generate_code();
        let now = Utc::now();
        let expires_at = now + Duration::minutes(ttl_minutes);

        sqlx::query(
            r#"
            INSERT INTO binding_codes (code, issued_at, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&code)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        tracing::info!("Issued binding code expiring at {}", expires_at);

        Ok(IssuedCode { code, expires_at })
    }

    /// Atomically consume a code and materialize a fresh code-origin device.
    ///
    /// The guarded UPDATE is the linearization point: of two concurrent
    /// consumers exactly one sees a changed row. Consumed and never-issued
    /// codes produce the same generic error so codes cannot be enumerated;
    /// only a genuinely expired code is reported as expired.
    pub async fn consume(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        code: &str,
    ) -> PatrolResult<PatrolDevice> {
        let code = code.trim();
        if code.is_empty() {
            return Err(PatrolError::Validation("Binding code is required".to_string()));
        }

        let now = Utc::now();
        let updated = sqlx::query(
            r#"
            UPDATE binding_codes
            SET consumed_at = ?
            WHERE code = ? AND consumed_at IS NULL AND expires_at > ?
            "#,
        )
        .bind(now)
        .bind(code)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Classify the failure without distinguishing "consumed" from
            // "never existed".
            let row = sqlx::query("SELECT consumed_at, expires_at FROM binding_codes WHERE code = ?")
                .bind(code)
                .fetch_optional(&mut **tx)
                .await?;

            if let Some(row) = row {
                let consumed_at: Option<DateTime<Utc>> = row.get("consumed_at");
                let expires_at: DateTime<Utc> = row.get("expires_at");
                if consumed_at.is_none() && expires_at <= now {
                    return Err(PatrolError::Expired(
                        "Binding code has expired, request a new one".to_string(),
                    ));
                }
            }
            return Err(PatrolError::NotFound("Binding code is not usable".to_string()));
        }

        let device = PatrolDevice {
            device_public_id: Uuid::new_v4().to_string(),
            origin: "code".to_string(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO patrol_devices (device_public_id, origin, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&device.device_public_id)
        .bind(&device.origin)
        .bind(device.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(device)
    }

    /// Delete expired, never-consumed codes. Returns the number removed.
    pub async fn purge_expired(&self) -> PatrolResult<u64> {
        let result = sqlx::query(
            "DELETE FROM binding_codes WHERE consumed_at IS NULL AND expires_at <= ?",
        )
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::models::BindingCode, test_support::test_pool};

    async fn test_db() -> SqlitePool {
        test_pool().await
    }

    #[test]
    fn test_generate_code_is_url_safe() {
        let code = BindingCodeIssuer::generate_code();
        assert!(code.len() >= 24);
        assert!(!code.contains('+'));
        assert!(!code.contains('/'));
        assert!(!code.contains('='));
    }

    #[tokio::test]
    async fn test_consume_succeeds_at_most_once() {
        let db = test_db().await;
        let issuer = BindingCodeIssuer::new(db.clone());

        let issued = issuer.issue(10).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let device = issuer.consume(&mut tx, &issued.code).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(device.origin, "code");

        // Second attempt always fails, with the generic not-usable error
        let mut tx = db.begin().await.unwrap();
        let err = issuer.consume(&mut tx, &issued.code).await.unwrap_err();
        assert!(matches!(err, PatrolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected_as_expired() {
        let db = test_db().await;
        let issuer = BindingCodeIssuer::new(db.clone());

        let past = Utc::now() - Duration::minutes(1);
        sqlx::query("INSERT INTO binding_codes (code, issued_at, expires_at) VALUES (?, ?, ?)")
            .bind("stale-code")
            .bind(past - Duration::minutes(10))
            .bind(past)
            .execute(&db)
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        let err = issuer.consume(&mut tx, "stale-code").await.unwrap_err();
        assert!(matches!(err, PatrolError::Expired(_)));
    }

    #[tokio::test]
    async fn test_unknown_code_indistinguishable_from_consumed() {
        let db = test_db().await;
        let issuer = BindingCodeIssuer::new(db.clone());

        let issued = issuer.issue(10).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        issuer.consume(&mut tx, &issued.code).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let consumed_err = issuer.consume(&mut tx, &issued.code).await.unwrap_err();
        drop(tx);
        let mut tx = db.begin().await.unwrap();
        let unknown_err = issuer.consume(&mut tx, "never-issued").await.unwrap_err();
        drop(tx);

        assert_eq!(consumed_err.to_string(), unknown_err.to_string());
    }

    #[tokio::test]
    async fn test_issuing_does_not_invalidate_outstanding_codes() {
        let db = test_db().await;
        let issuer = BindingCodeIssuer::new(db.clone());

        let first = issuer.issue(10).await.unwrap();
        let _second = issuer.issue(10).await.unwrap();

        let row: BindingCode = sqlx::query_as("SELECT * FROM binding_codes WHERE code = ?")
            .bind(&first.code)
            .fetch_one(&db)
            .await
            .unwrap();
        assert!(!row.is_consumed());
        assert!(!row.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_consumed_rows() {
        let db = test_db().await;
        let issuer = BindingCodeIssuer::new(db.clone());

        let past = Utc::now() - Duration::minutes(1);
        sqlx::query("INSERT INTO binding_codes (code, issued_at, expires_at) VALUES (?, ?, ?)")
            .bind("stale")
            .bind(past)
            .bind(past)
            .execute(&db)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO binding_codes (code, issued_at, expires_at, consumed_at) VALUES (?, ?, ?, ?)",
        )
        .bind("used")
        .bind(past)
        .bind(past)
        .bind(past)
        .execute(&db)
        .await
        .unwrap();

        let removed = issuer.purge_expired().await.unwrap();
        assert_eq!(removed, 1);
    }
}
