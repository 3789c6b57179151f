/// Permanent device registry
///
/// A permanent device identifier is created once and never deleted; the QR
/// payload embedding it is stable forever. Resolving the same identifier
/// always yields the same device and its current binding status.
use crate::{
    binding::DeviceStatus,
    db::models::{DeviceBinding, PatrolDevice},
    error::{PatrolError, PatrolResult},
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct DeviceRegistry {
    db: SqlitePool,
}

impl DeviceRegistry {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a new permanent device identifier
    pub async fn register(&self) -> PatrolResult<PatrolDevice> {
        let device = PatrolDevice {
            device_public_id: Uuid::new_v4().to_string(),
            origin: "permanent".to_string(),
            created_at: Utc::now(),
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
        .execute(&self.db)
        .await?;

        tracing::info!("Registered permanent device {}", device.device_public_id);

        Ok(device)
    }

    /// Look up a device by its permanent identifier
    pub async fn get(&self, device_public_id: &str) -> PatrolResult<PatrolDevice> {
        sqlx::query_as::<_, PatrolDevice>(
            "SELECT * FROM patrol_devices WHERE device_public_id = ?",
        )
        .bind(device_public_id.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PatrolError::NotFound("Device not found".to_string()))
    }

    /// Current active binding for a device, if any
    pub async fn active_binding(
        &self,
        device_public_id: &str,
    ) -> PatrolResult<Option<DeviceBinding>> {
        let binding = sqlx::query_as::<_, DeviceBinding>(
            r#"
            SELECT * FROM device_bindings
            WHERE device_public_id = ? AND is_active = 1
            ORDER BY id DESC
            "#,
        )
        .bind(device_public_id.trim())
        .fetch_optional(&self.db)
        .await?;

        Ok(binding)
    }

    /// Read-only binding status projection for the entry page.
    ///
    /// Unauthenticated by design: reveals coarse binding existence so the
    /// client can branch to "bind" vs "login", never the password.
    pub async fn status(&self, device_public_id: &str) -> PatrolResult<DeviceStatus> {
        let device = self.get(device_public_id).await?;
        let binding = self.active_binding(&device.device_public_id).await?;

        Ok(match binding {
            Some(b) => DeviceStatus {
                device_public_id: Some(device.device_public_id),
                is_bound: true,
                employee_name: Some(b.employee_name),
                site_name: Some(b.site_name),
                ua: b.user_agent,
                platform: b.platform,
                browser: b.browser,
                language: b.language,
                screen: b.screen_size,
                timezone: b.timezone,
                password_set: true,
                bound_at: Some(b.bound_at),
            },
            None => DeviceStatus {
                device_public_id: Some(device.device_public_id),
                is_bound: false,
                ..DeviceStatus::default()
            },
        })
    }

    /// Convenience status lookup keyed by the canonical fingerprint.
    ///
    /// Fingerprints are weak identity: this path is read-only UX and never
    /// authorizes a state change.
    pub async fn status_by_fingerprint(
        &self,
        fingerprint_json: &str,
    ) -> PatrolResult<DeviceStatus> {
        let binding = sqlx::query_as::<_, DeviceBinding>(
            r#"
            SELECT * FROM device_bindings
            WHERE fingerprint_json = ? AND is_active = 1
            ORDER BY id DESC
            "#,
        )
        .bind(fingerprint_json)
        .fetch_optional(&self.db)
        .await?;

        Ok(match binding {
            Some(b) => DeviceStatus {
                device_public_id: Some(b.device_public_id),
                is_bound: true,
                employee_name: Some(b.employee_name),
                site_name: Some(b.site_name),
                ua: b.user_agent,
                platform: b.platform,
                browser: b.browser,
                language: b.language,
                screen: b.screen_size,
                timezone: b.timezone,
                password_set: true,
                bound_at: Some(b.bound_at),
            },
            None => DeviceStatus {
                is_bound: false,
                ..DeviceStatus::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_binding, test_pool};

    #[tokio::test]
    async fn test_register_is_permanent_and_resolvable() {
        let db = test_pool().await;
        let registry = DeviceRegistry::new(db.clone());

        let device = registry.register().await.unwrap();
        let fetched = registry.get(&device.device_public_id).await.unwrap();
        assert_eq!(fetched.device_public_id, device.device_public_id);
        assert_eq!(fetched.origin, "permanent");

        // Re-resolving is idempotent
        let again = registry.get(&device.device_public_id).await.unwrap();
        assert_eq!(again.device_public_id, fetched.device_public_id);
    }

    #[tokio::test]
    async fn test_status_unbound_then_bound() {
        let db = test_pool().await;
        let registry = DeviceRegistry::new(db.clone());

        let device = registry.register().await.unwrap();
        let status = registry.status(&device.device_public_id).await.unwrap();
        assert!(!status.is_bound);
        assert!(status.employee_name.is_none());

        insert_binding(&db, &device.device_public_id, "王小明", "A棟", "hash", true).await;

        let status = registry.status(&device.device_public_id).await.unwrap();
        assert!(status.is_bound);
        assert_eq!(status.employee_name.as_deref(), Some("王小明"));
        assert_eq!(status.site_name.as_deref(), Some("A棟"));
        assert!(status.password_set);
    }

    #[tokio::test]
    async fn test_status_unknown_device_is_not_found() {
        let db = test_pool().await;
        let registry = DeviceRegistry::new(db);
        let err = registry.status("no-such-device").await.unwrap_err();
        assert!(matches!(err, PatrolError::NotFound(_)));
    }
}
