/// Device binding system
///
/// Covers the full binding lifecycle: one-time binding codes, permanent
/// device identifiers, the bind/login/unbind state machine, and opaque
/// device tokens.

mod codes;
mod manager;
mod registry;
mod tokens;

pub use codes::BindingCodeIssuer;
pub use manager::BindingManager;
pub use registry::DeviceRegistry;
pub use tokens::{TokenAuthority, ValidatedDevice};

use crate::fingerprint::DeviceFingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binding code issuance request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueBindingCodeRequest {
    pub expire_minutes: Option<i64>,
}

/// Issued binding code with its shareable URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingCodeIssued {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub bind_url: String,
    pub qr_value: String,
}

/// Issued permanent device QR
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermanentQrIssued {
    pub device_public_id: String,
    pub qr_url: String,
    pub qr_value: String,
    pub status: String, // always "permanent"
}

/// First-time bind via one-time code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindRequest {
    pub code: String,
    pub employee_name: String,
    pub password: String,
    pub site_name: String,
    pub device_fingerprint: DeviceFingerprint,
}

/// First-time bind against a permanent device identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBindRequest {
    pub employee_name: String,
    pub password: String,
    pub site_name: String,
    pub device_fingerprint: DeviceFingerprint,
}

/// Successful bind / login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindResponse {
    pub device_token: String,
    pub employee_name: String,
    pub site_name: String,
    pub bound_at: DateTime<Utc>,
}

/// Login on an already-bound device (fingerprint flow)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundLoginRequest {
    pub employee_name: String,
    pub password: String,
    pub device_fingerprint: DeviceFingerprint,
}

/// Login on an already-bound permanent device
///
/// `employee_name` is optional: a device has at most one active binding,
/// so the password alone identifies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceLoginRequest {
    pub employee_name: Option<String>,
    pub password: String,
    pub device_fingerprint: DeviceFingerprint,
}

/// Self-service unbind request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnbindRequest {
    pub employee_name: String,
    pub password: String,
    pub device_fingerprint: DeviceFingerprint,
}

/// Unbind response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnbindResponse {
    pub success: bool,
    pub message: String,
    pub unbound_at: DateTime<Utc>,
}

/// Read-only binding status projection
///
/// Unauthenticated: reveals coarse binding existence and the fingerprint
/// snapshot, never the password.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_public_id: Option<String>,
    pub is_bound: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub password_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_at: Option<DateTime<Utc>>,
}

/// Current device info for an authenticated device token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: i64,
    pub device_public_id: String,
    pub employee_name: String,
    pub site_name: String,
    pub is_active: bool,
    pub password_set: bool,
    pub bound_at: DateTime<Utc>,
    pub unbound_at: Option<DateTime<Utc>>,
    pub device_fingerprint: Option<String>,
}

/// Admin console binding list item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingAdminItem {
    pub id: i64,
    pub device_public_id: String,
    pub employee_name: String,
    pub site_name: String,
    pub is_active: bool,
    pub bound_at: DateTime<Utc>,
    pub unbound_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub platform: Option<String>,
    pub browser: Option<String>,
    pub language: Option<String>,
    pub screen_size: Option<String>,
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Paginated admin binding search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingAdminListResponse {
    pub items: Vec<BindingAdminItem>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Admin password reset request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminPasswordResetRequest {
    pub password: String,
}

/// Filters for the admin binding search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BindingSearchParams {
    pub query: Option<String>,
    pub employee_name: Option<String>,
    pub site_name: Option<String>,
    pub status: Option<String>, // "active" | "inactive" | "all"
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
