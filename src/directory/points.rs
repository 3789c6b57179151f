/// Patrol-point directory and QR payload resolution
///
/// A scanned payload arrives in one of several shapes accumulated over the
/// life of the deployed QR stickers, all of which must keep resolving:
/// - check-in URL: `{base}/patrol/checkin/{public_id}`
/// - legacy signed URL: `?point_id=…&nonce=…&sig=…` (truncated HMAC)
/// - URL with `?point_code=…`
/// - bare public_id or bare point_code
use crate::{
    config::ServerConfig,
    db::models::PatrolPoint,
    directory::{PointCreateRequest, PointItem, PointQr, PointUpdateRequest},
    error::{PatrolError, PatrolResult},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::SqlitePool;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Hex length of the truncated legacy QR signature
const LEGACY_SIG_LEN: usize = 20;

#[derive(Clone)]
pub struct PointDirectory {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl PointDirectory {
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Truncated HMAC-SHA256 over `"{point_id}:{nonce}"`, lowercase hex
    pub fn legacy_signature(&self, point_id: i64, nonce: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(
            self.config.auth.qr_signing_secret.as_bytes(),
        )
        .expect("HMAC can take key of any size");
        mac.update(format!("{}:{}", point_id, nonce).as_bytes());
        let mut sig = hex::encode(mac.finalize().into_bytes());
        sig.truncate(LEGACY_SIG_LEN);
        sig
    }

    fn verify_legacy_signature(&self, point_id: i64, nonce: &str, sig: &str) -> bool {
        let expected = self.legacy_signature(point_id, nonce);
        if expected.len() != sig.len() {
            return false;
        }
        // Constant-time compare; the truncated tag is still a secret
        expected
            .bytes()
            .zip(sig.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Resolve a scanned QR payload to an active patrol point.
    ///
    /// Unknown, inactive, and badly-signed payloads all collapse into the
    /// same not-found error.
    pub async fn resolve(&self, qr_value: &str) -> PatrolResult<PatrolPoint> {
        let raw = qr_value.trim();
        if raw.is_empty() {
            return Err(PatrolError::Validation("QR value is required".to_string()));
        }

        if let Ok(parsed) = Url::parse(raw) {
            return self.resolve_url(&parsed).await;
        }

        // Bare payload: public_id first (uuids never collide with codes)
        if let Some(point) = self.find_active("public_id", raw).await? {
            return Ok(point);
        }
        if let Some(point) = self.find_active("point_code", raw).await? {
            return Ok(point);
        }

        Err(PatrolError::NotFound("Patrol point not found".to_string()))
    }

    async fn resolve_url(&self, parsed: &Url) -> PatrolResult<PatrolPoint> {
        let query: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let param = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        // Legacy signed payload
        if let (Some(point_id), Some(nonce), Some(sig)) =
            (param("point_id"), param("nonce"), param("sig"))
        {
            let point_id: i64 = point_id
                .parse()
                .map_err(|_| PatrolError::NotFound("Patrol point not found".to_string()))?;
            if !self.verify_legacy_signature(point_id, nonce, sig) {
                return Err(PatrolError::NotFound("Patrol point not found".to_string()));
            }
            return self
                .find_active("id", &point_id.to_string())
                .await?
                .ok_or_else(|| PatrolError::NotFound("Patrol point not found".to_string()));
        }

        if let Some(code) = param("point_code") {
            return self
                .find_active("point_code", code)
                .await?
                .ok_or_else(|| PatrolError::NotFound("Patrol point not found".to_string()));
        }

        // Check-in URL: public_id is the segment after "checkin"
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        if let Some(idx) = segments.iter().position(|s| *s == "checkin") {
            if let Some(public_id) = segments.get(idx + 1) {
                return self
                    .find_active("public_id", public_id)
                    .await?
                    .ok_or_else(|| PatrolError::NotFound("Patrol point not found".to_string()));
            }
        }

        Err(PatrolError::NotFound("Patrol point not found".to_string()))
    }

    async fn find_active(&self, column: &str, value: &str) -> PatrolResult<Option<PatrolPoint>> {
        // `column` is one of three fixed names, never user input
        let sql = format!(
            "SELECT * FROM patrol_points WHERE {} = ? AND is_active = 1",
            column
        );
        Ok(sqlx::query_as::<_, PatrolPoint>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?)
    }

    /// Look up a point by its stable public id regardless of active state
    pub async fn get_by_public_id(&self, public_id: &str) -> PatrolResult<PatrolPoint> {
        sqlx::query_as::<_, PatrolPoint>("SELECT * FROM patrol_points WHERE public_id = ?")
            .bind(public_id.trim())
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PatrolError::NotFound("Patrol point not found".to_string()))
    }

    pub async fn list(&self, include_inactive: bool) -> PatrolResult<Vec<PointItem>> {
        let sql = if include_inactive {
            "SELECT * FROM patrol_points ORDER BY point_code"
        } else {
            "SELECT * FROM patrol_points WHERE is_active = 1 ORDER BY point_code"
        };
        let points = sqlx::query_as::<_, PatrolPoint>(sql)
            .fetch_all(&self.db)
            .await?;
        Ok(points.into_iter().map(Self::to_item).collect())
    }

    pub async fn create(&self, req: PointCreateRequest) -> PatrolResult<PointItem> {
        let point_code = req.point_code.trim();
        let point_name = req.point_name.trim();
        if point_code.is_empty() || point_name.is_empty() {
            return Err(PatrolError::Validation(
                "Point code and name are required".to_string(),
            ));
        }

        let now = Utc::now();
        let public_id = Uuid::new_v4().to_string();
        let result = sqlx::query(
            r#"
            INSERT INTO patrol_points (public_id, point_code, point_name, site_name, location, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(point_code)
        .bind(point_name)
        .bind(&req.site_name)
        .bind(&req.location)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                PatrolError::Validation("Point code already exists".to_string())
            }
            _ => PatrolError::Database(e),
        })?;

        tracing::info!("Created patrol point {} ({})", point_code, public_id);

        let point = sqlx::query_as::<_, PatrolPoint>("SELECT * FROM patrol_points WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.db)
            .await?;
        Ok(Self::to_item(point))
    }

    pub async fn update(&self, id: i64, req: PointUpdateRequest) -> PatrolResult<PointItem> {
        let point = sqlx::query_as::<_, PatrolPoint>("SELECT * FROM patrol_points WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PatrolError::NotFound("Patrol point not found".to_string()))?;

        let point_name = req.point_name.unwrap_or(point.point_name);
        let site_name = req.site_name.or(point.site_name);
        let location = req.location.or(point.location);
        let is_active = req.is_active.unwrap_or(point.is_active);

        sqlx::query(
            r#"
            UPDATE patrol_points
            SET point_name = ?, site_name = ?, location = ?, is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&point_name)
        .bind(&site_name)
        .bind(&location)
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        let updated = sqlx::query_as::<_, PatrolPoint>("SELECT * FROM patrol_points WHERE id = ?")
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        Ok(Self::to_item(updated))
    }

    /// Printable QR payload for an existing point
    pub async fn qr(&self, public_id: &str) -> PatrolResult<PointQr> {
        let point = self.get_by_public_id(public_id).await?;
        let qr_url = self.config.point_checkin_url(&point.public_id);
        Ok(PointQr {
            public_id: point.public_id,
            point_code: point.point_code,
            point_name: point.point_name,
            qr_value: qr_url.clone(),
            qr_url,
        })
    }

    fn to_item(point: PatrolPoint) -> PointItem {
        PointItem {
            id: point.id,
            public_id: point.public_id,
            point_code: point.point_code,
            point_name: point.point_name,
            site_name: point.site_name,
            location: point.location,
            is_active: point.is_active,
            created_at: point.created_at,
            updated_at: point.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_point, test_pool};

    async fn directory(db: &SqlitePool) -> PointDirectory {
        PointDirectory::new(db.clone(), Arc::new(crate::config::test_config()))
    }

    #[tokio::test]
    async fn test_resolve_checkin_url_and_bare_forms() {
        let db = test_pool().await;
        let dir = directory(&db).await;
        insert_point(&db, "pub-1", "P001", "大門", Some("A棟")).await;

        let by_url = dir
            .resolve("https://example.com/patrol/checkin/pub-1")
            .await
            .unwrap();
        assert_eq!(by_url.point_code, "P001");

        let by_public_id = dir.resolve("pub-1").await.unwrap();
        assert_eq!(by_public_id.id, by_url.id);

        let by_code = dir.resolve("P001").await.unwrap();
        assert_eq!(by_code.id, by_url.id);

        let by_query = dir
            .resolve("https://example.com/scan?point_code=P001")
            .await
            .unwrap();
        assert_eq!(by_query.id, by_url.id);
    }

    #[tokio::test]
    async fn test_resolve_legacy_signed_payload() {
        let db = test_pool().await;
        let dir = directory(&db).await;
        let id = insert_point(&db, "pub-1", "P001", "大門", None).await;

        let sig = dir.legacy_signature(id, "abc123");
        assert_eq!(sig.len(), LEGACY_SIG_LEN);

        let url = format!(
            "https://example.com/patrol/scan?point_id={}&nonce=abc123&sig={}",
            id, sig
        );
        let point = dir.resolve(&url).await.unwrap();
        assert_eq!(point.point_code, "P001");

        // Tampered signature is indistinguishable from an unknown point
        let bad = format!(
            "https://example.com/patrol/scan?point_id={}&nonce=abc123&sig={}",
            id, "00000000000000000000"
        );
        let err = dir.resolve(&bad).await.unwrap_err();
        assert!(matches!(err, PatrolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_inactive_point_does_not_resolve() {
        let db = test_pool().await;
        let dir = directory(&db).await;
        let id = insert_point(&db, "pub-1", "P001", "大門", None).await;

        dir.update(id, PointUpdateRequest {
            is_active: Some(false),
            ..PointUpdateRequest::default()
        })
        .await
        .unwrap();

        let err = dir.resolve("P001").await.unwrap_err();
        assert!(matches!(err, PatrolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_code() {
        let db = test_pool().await;
        let dir = directory(&db).await;

        let req = PointCreateRequest {
            point_code: "P001".to_string(),
            point_name: "大門".to_string(),
            site_name: None,
            location: None,
        };
        dir.create(req.clone()).await.unwrap();
        let err = dir.create(req).await.unwrap_err();
        assert!(matches!(err, PatrolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_qr_payload_round_trips_through_resolve() {
        let db = test_pool().await;
        let dir = directory(&db).await;
        insert_point(&db, "pub-9", "P009", "後門", None).await;

        let qr = dir.qr("pub-9").await.unwrap();
        let resolved = dir.resolve(&qr.qr_value).await.unwrap();
        assert_eq!(resolved.public_id, "pub-9");
    }
}
