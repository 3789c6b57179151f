/// Patrol-point and employee directories
///
/// Thin, read-mostly collaborators of the check-in gateway. Points carry the
/// QR payloads scanned in the field; employees back the public check-in flow.

mod employees;
mod points;

pub use employees::EmployeeDirectory;
pub use points::PointDirectory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// New patrol point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCreateRequest {
    pub point_code: String,
    pub point_name: String,
    pub site_name: Option<String>,
    pub location: Option<String>,
}

/// Partial patrol point update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointUpdateRequest {
    pub point_name: Option<String>,
    pub site_name: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

/// Printable QR payload for a point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointQr {
    pub public_id: String,
    pub point_code: String,
    pub point_name: String,
    pub qr_url: String,
    pub qr_value: String,
}

/// Point list item for the admin console
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointItem {
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
