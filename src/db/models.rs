/// Row models for the patrol database
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One-time binding code with a TTL
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BindingCode {
    pub id: i64,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl BindingCode {
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Device identifier record
///
/// Permanent devices carry a QR payload that never changes; code-origin
/// devices are materialized when a binding code is consumed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PatrolDevice {
    pub device_public_id: String,
    pub origin: String, // "code" or "permanent"
    pub created_at: DateTime<Utc>,
}

/// Device binding record
///
/// At most one row per device may have `is_active = true`, enforced by a
/// partial unique index.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub id: i64,
    pub device_public_id: String,
    pub employee_name: String,
    pub site_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub bound_at: DateTime<Utc>,
    pub unbound_at: Option<DateTime<Utc>>,
    pub fingerprint_json: Option<String>,
    pub user_agent: Option<String>,
    pub platform: Option<String>,
    pub browser: Option<String>,
    pub language: Option<String>,
    pub screen_size: Option<String>,
    pub timezone: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Opaque bearer token scoped to one binding
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeviceToken {
    pub token: String,
    pub binding_id: i64,
    pub issued_at: DateTime<Utc>,
}

/// Patrol point directory entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PatrolPoint {
    pub id: i64,
    pub public_id: String,
    pub point_code: String,
    pub point_name: String,
    pub site_name: Option<String>,
    pub location: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Employee directory entry (collaborator table, read-only for the core)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
}

/// Append-only check-in record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub id: i64,
    pub device_binding_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub point_id: Option<i64>,
    pub employee_name: String,
    pub site_name: String,
    pub point_code: String,
    pub point_name: String,
    pub checkin_at: DateTime<Utc>,
    pub qr_value: Option<String>,
    pub device_info: Option<String>,
    pub created_at: DateTime<Utc>,
}
