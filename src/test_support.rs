/// Shared helpers for in-module tests: an in-memory database with the full
/// schema, plus fixture inserters.
use crate::{
    binding::{BindingCodeIssuer, BindingManager, DeviceRegistry, TokenAuthority},
    checkin::CheckinGateway,
    context::AppContext,
    directory::{EmployeeDirectory, PointDirectory},
    fingerprint::DeviceFingerprint,
};
use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::sync::Arc;

/// In-memory pool carrying the same schema the migrations create.
/// Single connection: every pooled connection to `:memory:` would
/// otherwise get its own empty database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("connect in-memory db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");

    pool
}

/// Fully wired application context over an in-memory database, for
/// handler-level tests
pub async fn test_context() -> AppContext {
    let db = test_pool().await;
    let config = Arc::new(crate::config::test_config());

    let code_issuer = BindingCodeIssuer::new(db.clone());
    let token_authority = TokenAuthority::new(db.clone());
    let device_registry = DeviceRegistry::new(db.clone());
    let binding_manager =
        BindingManager::new(db.clone(), code_issuer.clone(), token_authority.clone());
    let point_directory = PointDirectory::new(db.clone(), config.clone());
    let employee_directory = EmployeeDirectory::new(db.clone());
    let checkin_gateway = CheckinGateway::new(
        db.clone(),
        point_directory.clone(),
        employee_directory.clone(),
        config.checkin.cooldown_seconds,
    );

    AppContext {
        config,
        db,
        code_issuer,
        device_registry,
        binding_manager,
        token_authority,
        point_directory,
        employee_directory,
        checkin_gateway,
    }
}

pub fn sample_fingerprint() -> DeviceFingerprint {
    DeviceFingerprint {
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)".to_string(),
        platform: "iPhone".to_string(),
        browser: "Safari".to_string(),
        language: "zh-TW".to_string(),
        screen: "390x844".to_string(),
        timezone: "Asia/Taipei".to_string(),
        ip: None,
    }
}

/// Insert a binding row (and its device row if missing), returning the
/// binding id.
pub async fn insert_binding(
    db: &SqlitePool,
    device_public_id: &str,
    employee_name: &str,
    site_name: &str,
    password_hash: &str,
    is_active: bool,
) -> i64 {
    let now = Utc::now();

    sqlx::query(
        "INSERT OR IGNORE INTO patrol_devices (device_public_id, origin, created_at) VALUES (?, 'permanent', ?)",
    )
    .bind(device_public_id)
    .bind(now)
    .execute(db)
    .await
    .expect("insert device");

    let fingerprint_json = sample_fingerprint().canonical_json();
    sqlx::query(
        r#"
        INSERT INTO device_bindings (
            device_public_id, employee_name, site_name, password_hash,
            is_active, bound_at, fingerprint_json, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(device_public_id)
    .bind(employee_name)
    .bind(site_name)
    .bind(password_hash)
    .bind(is_active)
    .bind(now)
    .bind(&fingerprint_json)
    .bind(now)
    .execute(db)
    .await
    .expect("insert binding")
    .last_insert_rowid()
}

/// Insert a patrol point, returning its row id
pub async fn insert_point(
    db: &SqlitePool,
    public_id: &str,
    point_code: &str,
    point_name: &str,
    site_name: Option<&str>,
) -> i64 {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO patrol_points (public_id, point_code, point_name, site_name, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(public_id)
    .bind(point_code)
    .bind(point_name)
    .bind(site_name)
    .bind(now)
    .bind(now)
    .execute(db)
    .await
    .expect("insert point")
    .last_insert_rowid()
}

/// Insert an employee, returning their row id
pub async fn insert_employee(db: &SqlitePool, name: &str) -> i64 {
    sqlx::query("INSERT INTO employees (name) VALUES (?)")
        .bind(name)
        .execute(db)
        .await
        .expect("insert employee")
        .last_insert_rowid()
}
