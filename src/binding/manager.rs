/// Device binding state machine
///
/// Owns the UNBOUND/BOUND lifecycle per device: bind (code and permanent
/// flows), login on a bound device, self-service unbind, and the privileged
/// admin operations. Every transition runs in a single transaction; a failed
/// transition leaves state unchanged.
use crate::{
    binding::{
        BindRequest, BindResponse, BindingAdminItem, BindingAdminListResponse,
        BindingCodeIssuer, BindingSearchParams, BoundLoginRequest, DeviceBindRequest,
        DeviceInfo, DeviceLoginRequest, TokenAuthority, UnbindRequest, UnbindResponse,
        ValidatedDevice,
    },
    db::models::DeviceBinding,
    error::{PatrolError, PatrolResult},
    fingerprint::DeviceFingerprint,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Row, SqlitePool};

#[derive(Clone)]
pub struct BindingManager {
    db: SqlitePool,
    codes: BindingCodeIssuer,
    tokens: TokenAuthority,
}

impl BindingManager {
    pub fn new(db: SqlitePool, codes: BindingCodeIssuer, tokens: TokenAuthority) -> Self {
        Self { db, codes, tokens }
    }

    /// Hash a password with Argon2id
    pub fn hash_password(password: &str) -> PatrolResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PatrolError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored hash
    pub fn verify_password(password: &str, hash: &str) -> PatrolResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| PatrolError::Internal(format!("Stored hash is invalid: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    fn require_fields(employee_name: &str, password: &str, site_name: &str) -> PatrolResult<()> {
        if employee_name.trim().is_empty() {
            return Err(PatrolError::Validation("Employee name is required".to_string()));
        }
        if password.trim().is_empty() {
            return Err(PatrolError::Validation("Password is required".to_string()));
        }
        if site_name.trim().is_empty() {
            return Err(PatrolError::Validation("Site name is required".to_string()));
        }
        Ok(())
    }

    /// UNBOUND -> BOUND via one-time binding code.
    ///
    /// Code consumption, binding creation, and token issuance commit
    /// together or not at all.
    pub async fn bind(&self, req: BindRequest, ip: Option<String>) -> PatrolResult<BindResponse> {
        Self::require_fields(&req.employee_name, &req.password, &req.site_name)?;

        let password_hash = Self::hash_password(req.password.trim())?;
        let mut tx = self.db.begin().await?;

        // The code flow mints a fresh device row, so the unique index cannot
        // catch a re-bind of the same physical device; the canonical
        // fingerprint is the duplicate check here. Rejecting before consume
        // leaves the code usable.
        let fingerprint_json = req.device_fingerprint.canonical_json();
        let existing = sqlx::query(
            "SELECT 1 FROM device_bindings WHERE fingerprint_json = ? AND is_active = 1",
        )
        .bind(&fingerprint_json)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(PatrolError::AlreadyBound(
                "Device already has an active binding, unbind it first or log in".to_string(),
            ));
        }

        let device = self.codes.consume(&mut tx, &req.code).await?;
        let (binding, token) = self
            .insert_binding(&mut tx, &device.device_public_id, &req.employee_name,
                &req.site_name, &password_hash, &req.device_fingerprint, ip)
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Bound device {} to {} at {}",
            binding.device_public_id, binding.employee_name, binding.site_name
        );

        Ok(BindResponse {
            device_token: token,
            employee_name: binding.employee_name,
            site_name: binding.site_name,
            bound_at: binding.bound_at,
        })
    }

    /// UNBOUND -> BOUND against a permanent device identifier
    pub async fn bind_permanent(
        &self,
        device_public_id: &str,
        req: DeviceBindRequest,
        ip: Option<String>,
    ) -> PatrolResult<BindResponse> {
        Self::require_fields(&req.employee_name, &req.password, &req.site_name)?;

        let password_hash = Self::hash_password(req.password.trim())?;
        let mut tx = self.db.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM patrol_devices WHERE device_public_id = ?")
            .bind(device_public_id.trim())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(PatrolError::NotFound("Device not found".to_string()));
        }

        let (binding, token) = self
            .insert_binding(&mut tx, device_public_id.trim(), &req.employee_name,
                &req.site_name, &password_hash, &req.device_fingerprint, ip)
            .await?;

        tx.commit().await?;

        Ok(BindResponse {
            device_token: token,
            employee_name: binding.employee_name,
            site_name: binding.site_name,
            bound_at: binding.bound_at,
        })
    }

    /// Insert the binding row and its first token.
    ///
    /// The partial unique index on active bindings is the race check: of two
    /// concurrent binds for the same device exactly one insert survives.
    async fn insert_binding(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        device_public_id: &str,
        employee_name: &str,
        site_name: &str,
        password_hash: &str,
        fingerprint: &DeviceFingerprint,
        ip: Option<String>,
    ) -> PatrolResult<(DeviceBinding, String)> {
        let now = Utc::now();
        let fingerprint_json = fingerprint.canonical_json();

        let result = sqlx::query(
            r#"
            INSERT INTO device_bindings (
                device_public_id, employee_name, site_name, password_hash,
                is_active, bound_at, fingerprint_json, user_agent, platform,
                browser, language, screen_size, timezone, ip_address, created_at
            )
            VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(device_public_id)
        .bind(employee_name.trim())
        .bind(site_name.trim())
        .bind(password_hash)
        .bind(now)
        .bind(&fingerprint_json)
        .bind(&fingerprint.user_agent)
        .bind(&fingerprint.platform)
        .bind(&fingerprint.browser)
        .bind(&fingerprint.language)
        .bind(&fingerprint.screen)
        .bind(&fingerprint.timezone)
        .bind(&ip)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                PatrolError::AlreadyBound(
                    "Device already has an active binding, unbind it first or log in".to_string(),
                )
            }
            _ => PatrolError::Database(e),
        })?;

        let binding_id = result.last_insert_rowid();
        let token = self.tokens.issue(tx, binding_id).await?;

        let binding = sqlx::query_as::<_, DeviceBinding>(
            "SELECT * FROM device_bindings WHERE id = ?",
        )
        .bind(binding_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok((binding, token))
    }

    /// BOUND -> BOUND login on the fingerprint flow.
    ///
    /// Looks up the active binding by employee name and canonical
    /// fingerprint; a mismatch of either reports the same credential error
    /// so names cannot be probed.
    pub async fn bound_login(&self, req: BoundLoginRequest) -> PatrolResult<BindResponse> {
        if req.password.trim().is_empty() {
            return Err(PatrolError::Validation("Password is required".to_string()));
        }

        let fingerprint_json = req.device_fingerprint.canonical_json();
        let binding = sqlx::query_as::<_, DeviceBinding>(
            r#"
            SELECT * FROM device_bindings
            WHERE employee_name = ? AND fingerprint_json = ? AND is_active = 1
            ORDER BY id DESC
            "#,
        )
        .bind(req.employee_name.trim())
        .bind(&fingerprint_json)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PatrolError::NotBound("Device is not bound yet".to_string()))?;

        self.login_binding(&binding, &req.password).await
    }

    /// BOUND -> BOUND login on the permanent flow.
    ///
    /// `employee_name` is optional: the device has at most one active
    /// binding, so the password alone identifies it.
    pub async fn login_by_device(
        &self,
        device_public_id: &str,
        req: DeviceLoginRequest,
    ) -> PatrolResult<BindResponse> {
        if req.password.trim().is_empty() {
            return Err(PatrolError::Validation("Password is required".to_string()));
        }

        let binding = sqlx::query_as::<_, DeviceBinding>(
            r#"
            SELECT * FROM device_bindings
            WHERE device_public_id = ? AND is_active = 1
            ORDER BY id DESC
            "#,
        )
        .bind(device_public_id.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PatrolError::NotBound("Device is not bound yet".to_string()))?;

        if let Some(name) = &req.employee_name {
            if !name.trim().is_empty() && name.trim() != binding.employee_name {
                return Err(PatrolError::InvalidCredential("Wrong password".to_string()));
            }
        }

        self.login_binding(&binding, &req.password).await
    }

    async fn login_binding(
        &self,
        binding: &DeviceBinding,
        password: &str,
    ) -> PatrolResult<BindResponse> {
        if !Self::verify_password(password.trim(), &binding.password_hash)? {
            return Err(PatrolError::InvalidCredential("Wrong password".to_string()));
        }

        let token = self.tokens.issue_standalone(binding.id).await?;

        Ok(BindResponse {
            device_token: token,
            employee_name: binding.employee_name.clone(),
            site_name: binding.site_name.clone(),
            bound_at: binding.bound_at,
        })
    }

    /// BOUND -> UNBOUND on the fingerprint flow (self-service, password required)
    pub async fn unbind(&self, req: UnbindRequest) -> PatrolResult<UnbindResponse> {
        let fingerprint_json = req.device_fingerprint.canonical_json();
        let binding = sqlx::query_as::<_, DeviceBinding>(
            r#"
            SELECT * FROM device_bindings
            WHERE employee_name = ? AND fingerprint_json = ? AND is_active = 1
            ORDER BY id DESC
            "#,
        )
        .bind(req.employee_name.trim())
        .bind(&fingerprint_json)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PatrolError::NotBound("No active binding found".to_string()))?;

        self.close_binding(&binding, Some(&req.password)).await
    }

    /// BOUND -> UNBOUND on the permanent flow (self-service, password required)
    pub async fn unbind_by_device(
        &self,
        device_public_id: &str,
        req: UnbindRequest,
    ) -> PatrolResult<UnbindResponse> {
        let binding = sqlx::query_as::<_, DeviceBinding>(
            r#"
            SELECT * FROM device_bindings
            WHERE device_public_id = ? AND is_active = 1
            ORDER BY id DESC
            "#,
        )
        .bind(device_public_id.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PatrolError::NotBound("No active binding found".to_string()))?;

        self.close_binding(&binding, Some(&req.password)).await
    }

    /// Close a binding. `password` of `None` is the privileged path.
    ///
    /// Tokens are not touched here: validation joins on `is_active`, so they
    /// all die the instant this commits.
    async fn close_binding(
        &self,
        binding: &DeviceBinding,
        password: Option<&str>,
    ) -> PatrolResult<UnbindResponse> {
        if let Some(password) = password {
            if !Self::verify_password(password.trim(), &binding.password_hash)? {
                return Err(PatrolError::InvalidCredential(
                    "Wrong password, cannot unbind".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let updated = sqlx::query(
            r#"
            UPDATE device_bindings
            SET is_active = 0, unbound_at = ?
            WHERE id = ? AND is_active = 1
            "#,
        )
        .bind(now)
        .bind(binding.id)
        .execute(&self.db)
        .await?;

        if updated.rows_affected() == 0 {
            // Lost a race with another unbind
            return Err(PatrolError::NotBound("No active binding found".to_string()));
        }

        tracing::info!(
            "Unbound device {} (binding {})",
            binding.device_public_id, binding.id
        );

        Ok(UnbindResponse {
            success: true,
            message: "Unbound successfully".to_string(),
            unbound_at: now,
        })
    }

    /// Current device info for an authenticated token
    pub async fn device_info(&self, validated: &ValidatedDevice) -> PatrolResult<DeviceInfo> {
        let binding = sqlx::query_as::<_, DeviceBinding>(
            "SELECT * FROM device_bindings WHERE id = ?",
        )
        .bind(validated.binding_id)
        .fetch_one(&self.db)
        .await?;

        Ok(DeviceInfo {
            id: binding.id,
            device_public_id: binding.device_public_id,
            employee_name: binding.employee_name,
            site_name: binding.site_name,
            is_active: binding.is_active,
            password_set: !binding.password_hash.is_empty(),
            bound_at: binding.bound_at,
            unbound_at: binding.unbound_at,
            device_fingerprint: binding.fingerprint_json,
        })
    }

    /// Privileged password reset.
    ///
    /// Bypasses the old password; existing tokens stay valid. This is for
    /// recovering access, not forcing logout.
    pub async fn admin_reset_password(
        &self,
        binding_id: i64,
        new_password: &str,
    ) -> PatrolResult<BindingAdminItem> {
        if new_password.trim().is_empty() {
            return Err(PatrolError::Validation("Password is required".to_string()));
        }

        let password_hash = Self::hash_password(new_password.trim())?;
        let updated = sqlx::query(
            "UPDATE device_bindings SET password_hash = ? WHERE id = ? AND is_active = 1",
        )
        .bind(&password_hash)
        .bind(binding_id)
        .execute(&self.db)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(PatrolError::NotBound("No active binding found".to_string()));
        }

        tracing::info!("Admin reset password for binding {}", binding_id);

        let binding = sqlx::query_as::<_, DeviceBinding>(
            "SELECT * FROM device_bindings WHERE id = ?",
        )
        .bind(binding_id)
        .fetch_one(&self.db)
        .await?;

        Ok(Self::to_admin_item(binding))
    }

    /// Privileged unbind: no password check, otherwise identical to self-service
    pub async fn admin_unbind(&self, binding_id: i64) -> PatrolResult<UnbindResponse> {
        let binding = sqlx::query_as::<_, DeviceBinding>(
            "SELECT * FROM device_bindings WHERE id = ? AND is_active = 1",
        )
        .bind(binding_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PatrolError::NotBound("No active binding found".to_string()))?;

        self.close_binding(&binding, None).await
    }

    /// Paginated admin search across all bindings
    pub async fn list_bindings(
        &self,
        params: BindingSearchParams,
    ) -> PatrolResult<BindingAdminListResponse> {
        let limit = params.limit.unwrap_or(100).clamp(1, 500);
        let offset = params.offset.unwrap_or(0).max(0);
        let status = params.status.as_deref().unwrap_or("all");

        let mut builder = QueryBuilder::new("SELECT * FROM device_bindings WHERE 1 = 1");
        let mut count_builder =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM device_bindings WHERE 1 = 1");

        for b in [&mut builder, &mut count_builder] {
            match status {
                "active" => {
                    b.push(" AND is_active = 1");
                }
                "inactive" => {
                    b.push(" AND is_active = 0");
                }
                _ => {}
            }
            if let Some(query) = params.query.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                let like = format!("%{}%", query);
                b.push(" AND (employee_name LIKE ")
                    .push_bind(like.clone())
                    .push(" OR site_name LIKE ")
                    .push_bind(like.clone())
                    .push(" OR device_public_id LIKE ")
                    .push_bind(like)
                    .push(")");
            }
            if let Some(name) = params
                .employee_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                b.push(" AND employee_name LIKE ").push_bind(format!("%{}%", name));
            }
            if let Some(site) = params
                .site_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                b.push(" AND site_name LIKE ").push_bind(format!("%{}%", site));
            }
        }

        let total: i64 = count_builder
            .build()
            .fetch_one(&self.db)
            .await?
            .get("total");

        builder
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let bindings = builder
            .build_query_as::<DeviceBinding>()
            .fetch_all(&self.db)
            .await?;

        Ok(BindingAdminListResponse {
            items: bindings.into_iter().map(Self::to_admin_item).collect(),
            total,
            limit,
            offset,
        })
    }

    fn to_admin_item(binding: DeviceBinding) -> BindingAdminItem {
        BindingAdminItem {
            id: binding.id,
            device_public_id: binding.device_public_id,
            employee_name: binding.employee_name,
            site_name: binding.site_name,
            is_active: binding.is_active,
            bound_at: binding.bound_at,
            unbound_at: binding.unbound_at,
            user_agent: binding.user_agent,
            platform: binding.platform,
            browser: binding.browser,
            language: binding.language,
            screen_size: binding.screen_size,
            timezone: binding.timezone,
            created_at: binding.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_fingerprint, test_pool};

    fn manager(db: &SqlitePool) -> BindingManager {
        BindingManager::new(
            db.clone(),
            BindingCodeIssuer::new(db.clone()),
            TokenAuthority::new(db.clone()),
        )
    }

    fn bind_request(code: &str) -> BindRequest {
        BindRequest {
            code: code.to_string(),
            employee_name: "王小明".to_string(),
            password: "pass1".to_string(),
            site_name: "A棟".to_string(),
            device_fingerprint: sample_fingerprint(),
        }
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = BindingManager::hash_password("pass1").unwrap();
        assert!(BindingManager::verify_password("pass1", &hash).unwrap());
        assert!(!BindingManager::verify_password("pass2", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_bind_consumes_code_and_issues_token() {
        let db = test_pool().await;
        let mgr = manager(&db);

        let issued = BindingCodeIssuer::new(db.clone()).issue(10).await.unwrap();
        let response = mgr.bind(bind_request(&issued.code), None).await.unwrap();
        assert_eq!(response.employee_name, "王小明");
        assert!(!response.device_token.is_empty());

        // Code is single-use: binding again with the same code fails and
        // leaves no partial state behind
        let err = mgr.bind(bind_request(&issued.code), None).await.unwrap_err();
        assert!(matches!(err, PatrolError::NotFound(_)));

        let bindings: i64 = sqlx::query("SELECT COUNT(*) AS n FROM device_bindings")
            .fetch_one(&db)
            .await
            .unwrap()
            .get("n");
        assert_eq!(bindings, 1);
    }

    #[tokio::test]
    async fn test_code_flow_rejects_second_bind_for_same_fingerprint() {
        let db = test_pool().await;
        let mgr = manager(&db);
        let issuer = BindingCodeIssuer::new(db.clone());

        let first = issuer.issue(10).await.unwrap();
        mgr.bind(bind_request(&first.code), None).await.unwrap();

        // Same physical device (same canonical fingerprint), fresh code:
        // must be rejected while the first binding is active
        let second = issuer.issue(10).await.unwrap();
        let err = mgr.bind(bind_request(&second.code), None).await.unwrap_err();
        assert!(matches!(err, PatrolError::AlreadyBound(_)));

        let active: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM device_bindings WHERE is_active = 1")
                .fetch_one(&db)
                .await
                .unwrap()
                .get("n");
        assert_eq!(active, 1);

        // The rejected bind consumed nothing: after unbinding, the second
        // code still works
        mgr.unbind(UnbindRequest {
            employee_name: "王小明".to_string(),
            password: "pass1".to_string(),
            device_fingerprint: sample_fingerprint(),
        })
        .await
        .unwrap();
        mgr.bind(bind_request(&second.code), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_rejects_empty_fields() {
        let db = test_pool().await;
        let mgr = manager(&db);

        let mut req = bind_request("whatever");
        req.site_name = "  ".to_string();
        let err = mgr.bind(req, None).await.unwrap_err();
        assert!(matches!(err, PatrolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_permanent_device_single_active_binding() {
        let db = test_pool().await;
        let mgr = manager(&db);
        let registry = crate::binding::DeviceRegistry::new(db.clone());

        let device = registry.register().await.unwrap();
        let req = DeviceBindRequest {
            employee_name: "王小明".to_string(),
            password: "pass1".to_string(),
            site_name: "A棟".to_string(),
            device_fingerprint: sample_fingerprint(),
        };

        mgr.bind_permanent(&device.device_public_id, req.clone(), None)
            .await
            .unwrap();

        // Second bind while already bound must fail
        let err = mgr
            .bind_permanent(&device.device_public_id, req, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PatrolError::AlreadyBound(_)));
    }

    #[tokio::test]
    async fn test_scenario_login_then_unbind_with_wrong_password() {
        let db = test_pool().await;
        let mgr = manager(&db);

        let issued = BindingCodeIssuer::new(db.clone()).issue(10).await.unwrap();
        mgr.bind(bind_request(&issued.code), None).await.unwrap();

        // bound-login with the right password issues a fresh token
        let login = mgr
            .bound_login(BoundLoginRequest {
                employee_name: "王小明".to_string(),
                password: "pass1".to_string(),
                device_fingerprint: sample_fingerprint(),
            })
            .await
            .unwrap();
        assert!(!login.device_token.is_empty());

        // unbind with the wrong password is rejected and state stays bound
        let err = mgr
            .unbind(UnbindRequest {
                employee_name: "王小明".to_string(),
                password: "pass2".to_string(),
                device_fingerprint: sample_fingerprint(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PatrolError::InvalidCredential(_)));

        let active: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM device_bindings WHERE is_active = 1")
                .fetch_one(&db)
                .await
                .unwrap()
                .get("n");
        assert_eq!(active, 1);

        // Previously issued tokens are still valid after the failed unbind
        let authority = TokenAuthority::new(db.clone());
        assert!(authority.validate(&login.device_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_unbind_revokes_all_tokens_and_allows_rebind() {
        let db = test_pool().await;
        let mgr = manager(&db);
        let registry = crate::binding::DeviceRegistry::new(db.clone());
        let authority = TokenAuthority::new(db.clone());

        let device = registry.register().await.unwrap();
        let req = DeviceBindRequest {
            employee_name: "王小明".to_string(),
            password: "pass1".to_string(),
            site_name: "A棟".to_string(),
            device_fingerprint: sample_fingerprint(),
        };
        let bound = mgr
            .bind_permanent(&device.device_public_id, req.clone(), None)
            .await
            .unwrap();

        let unbound = mgr
            .unbind_by_device(
                &device.device_public_id,
                UnbindRequest {
                    employee_name: "王小明".to_string(),
                    password: "pass1".to_string(),
                    device_fingerprint: sample_fingerprint(),
                },
            )
            .await
            .unwrap();
        assert!(unbound.success);

        // Every outstanding token is dead immediately
        let err = authority.validate(&bound.device_token).await.unwrap_err();
        assert!(matches!(err, PatrolError::InvalidCredential(_)));

        // The device reverts to UNBOUND and may be bound again (fresh record)
        let rebound = mgr
            .bind_permanent(&device.device_public_id, req, None)
            .await
            .unwrap();
        assert!(!rebound.device_token.is_empty());

        let rows: i64 = sqlx::query("SELECT COUNT(*) AS n FROM device_bindings")
            .fetch_one(&db)
            .await
            .unwrap()
            .get("n");
        assert_eq!(rows, 2);
    }

    #[tokio::test]
    async fn test_admin_reset_password_keeps_binding_and_tokens() {
        let db = test_pool().await;
        let mgr = manager(&db);
        let registry = crate::binding::DeviceRegistry::new(db.clone());
        let authority = TokenAuthority::new(db.clone());

        let device = registry.register().await.unwrap();
        let bound = mgr
            .bind_permanent(
                &device.device_public_id,
                DeviceBindRequest {
                    employee_name: "王小明".to_string(),
                    password: "pass1".to_string(),
                    site_name: "A棟".to_string(),
                    device_fingerprint: sample_fingerprint(),
                },
                None,
            )
            .await
            .unwrap();

        let binding_id = authority.validate(&bound.device_token).await.unwrap().binding_id;
        let item = mgr.admin_reset_password(binding_id, "newpass").await.unwrap();
        assert!(item.is_active);

        // Old password is dead, new one works, old tokens survive
        let old = mgr
            .login_by_device(
                &device.device_public_id,
                DeviceLoginRequest {
                    employee_name: None,
                    password: "pass1".to_string(),
                    device_fingerprint: sample_fingerprint(),
                },
            )
            .await;
        assert!(matches!(old.unwrap_err(), PatrolError::InvalidCredential(_)));

        let fresh = mgr
            .login_by_device(
                &device.device_public_id,
                DeviceLoginRequest {
                    employee_name: None,
                    password: "newpass".to_string(),
                    device_fingerprint: sample_fingerprint(),
                },
            )
            .await
            .unwrap();
        assert!(!fresh.device_token.is_empty());
        assert!(authority.validate(&bound.device_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_admin_unbind_bypasses_password() {
        let db = test_pool().await;
        let mgr = manager(&db);
        let registry = crate::binding::DeviceRegistry::new(db.clone());

        let device = registry.register().await.unwrap();
        let bound = mgr
            .bind_permanent(
                &device.device_public_id,
                DeviceBindRequest {
                    employee_name: "李大華".to_string(),
                    password: "pass1".to_string(),
                    site_name: "B棟".to_string(),
                    device_fingerprint: sample_fingerprint(),
                },
                None,
            )
            .await
            .unwrap();

        let authority = TokenAuthority::new(db.clone());
        let binding_id = authority.validate(&bound.device_token).await.unwrap().binding_id;

        mgr.admin_unbind(binding_id).await.unwrap();
        assert!(authority.validate(&bound.device_token).await.is_err());

        // Second admin unbind reports not-bound
        let err = mgr.admin_unbind(binding_id).await.unwrap_err();
        assert!(matches!(err, PatrolError::NotBound(_)));
    }

    #[tokio::test]
    async fn test_list_bindings_filters_and_paginates() {
        let db = test_pool().await;
        let mgr = manager(&db);
        let registry = crate::binding::DeviceRegistry::new(db.clone());

        for (name, site) in [("王小明", "A棟"), ("李大華", "B棟")] {
            let device = registry.register().await.unwrap();
            mgr.bind_permanent(
                &device.device_public_id,
                DeviceBindRequest {
                    employee_name: name.to_string(),
                    password: "pass1".to_string(),
                    site_name: site.to_string(),
                    device_fingerprint: sample_fingerprint(),
                },
                None,
            )
            .await
            .unwrap();
        }

        let all = mgr.list_bindings(BindingSearchParams::default()).await.unwrap();
        assert_eq!(all.total, 2);

        let filtered = mgr
            .list_bindings(BindingSearchParams {
                employee_name: Some("王小明".to_string()),
                ..BindingSearchParams::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.items[0].employee_name, "王小明");

        let paged = mgr
            .list_bindings(BindingSearchParams {
                limit: Some(1),
                offset: Some(1),
                ..BindingSearchParams::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.total, 2);
        assert_eq!(paged.items.len(), 1);
    }
}
