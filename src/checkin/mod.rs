/// Check-in gateway
///
/// The single write path for check-in records: resolves the scanned QR
/// payload and the scanning identity, enforces the duplicate-scan cooldown,
/// and appends the record.

mod gateway;

pub use gateway::{CheckinGateway, CheckinIdentity};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Device-flow check-in body (identity comes from the device token)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinRequest {
    pub qr_value: String,
}

/// Public-flow check-in body (identity is an explicit employee reference)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicCheckinRequest {
    pub employee_id: Option<i64>,
    pub employee_name: Option<String>,
}

/// Accepted check-in, with denormalized display fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinResponse {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<i64>,
    pub employee_name: String,
    pub site_name: String,
    pub point_code: String,
    pub point_name: String,
    pub checkin_at: DateTime<Utc>,
    /// AM/PM label in local wall time, for the confirmation screen
    pub checkin_period: String,
    pub created_at: DateTime<Utc>,
}

/// Filters for the admin record listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub employee_name: Option<String>,
    pub site_name: Option<String>,
    pub point_code: Option<String>,
    pub limit: Option<i64>,
}
