/// Cooldown enforcement and the append-only check-in write path
use crate::{
    binding::ValidatedDevice,
    checkin::{CheckinResponse, PublicCheckinRequest, RecordQuery},
    db::models::{CheckinRecord, Employee, PatrolPoint},
    directory::{EmployeeDirectory, PointDirectory},
    error::{PatrolError, PatrolResult},
};
use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;

/// Wall-clock offset for the AM/PM display label (UTC+8)
const DISPLAY_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Who is checking in
#[derive(Debug, Clone)]
pub enum CheckinIdentity {
    /// Bound-device flow: identity comes from a validated device token
    Binding(ValidatedDevice),
    /// Public flow: identity is an explicit employee record
    Employee(Employee),
}

impl CheckinIdentity {
    /// Serialization key for the per-(identity, point) lock and cooldown
    fn lock_key(&self, point_id: i64) -> String {
        match self {
            CheckinIdentity::Binding(device) => format!("b:{}:{}", device.binding_id, point_id),
            CheckinIdentity::Employee(employee) => format!("e:{}:{}", employee.id, point_id),
        }
    }
}

#[derive(Clone)]
pub struct CheckinGateway {
    db: SqlitePool,
    points: PointDirectory,
    employees: EmployeeDirectory,
    cooldown_seconds: i64,
    // One async mutex per (identity, point) key, held across the
    // read-compare-insert sequence. Entries are never evicted; the key
    // space is bounded by bindings x points.
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CheckinGateway {
    pub fn new(
        db: SqlitePool,
        points: PointDirectory,
        employees: EmployeeDirectory,
        cooldown_seconds: i64,
    ) -> Self {
        Self {
            db,
            points,
            employees,
            cooldown_seconds,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bound-device check-in: resolve the scanned payload, then record
    /// against the device's binding.
    pub async fn checkin_device(
        &self,
        device: &ValidatedDevice,
        qr_value: &str,
    ) -> PatrolResult<CheckinResponse> {
        let point = self.points.resolve(qr_value).await?;
        self.record(
            CheckinIdentity::Binding(device.clone()),
            &point,
            Some(qr_value.trim().to_string()),
        )
        .await
    }

    /// Public check-in at a point identified by its public id; the caller
    /// names the employee explicitly.
    pub async fn checkin_public(
        &self,
        point_public_id: &str,
        req: PublicCheckinRequest,
    ) -> PatrolResult<CheckinResponse> {
        let point = self.points.resolve(point_public_id).await?;

        let employee = match (req.employee_id, req.employee_name.as_deref()) {
            (Some(id), _) => self.employees.get(id).await?,
            (None, Some(name)) if !name.trim().is_empty() => self
                .employees
                .find_by_name(name)
                .await?
                .ok_or_else(|| PatrolError::NotFound("Employee not found".to_string()))?,
            _ => {
                return Err(PatrolError::Validation(
                    "employee_id or employee_name is required".to_string(),
                ))
            }
        };

        self.record(CheckinIdentity::Employee(employee), &point, None)
            .await
    }

    /// Serialized cooldown check + insert for one (identity, point) key.
    ///
    /// Two scans of the same point by the same identity inside the window
    /// produce exactly one record and one cooldown rejection, regardless of
    /// interleaving.
    pub async fn record(
        &self,
        identity: CheckinIdentity,
        point: &PatrolPoint,
        qr_value: Option<String>,
    ) -> PatrolResult<CheckinResponse> {
        let key = identity.lock_key(point.id);
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _guard = lock.lock().await;

        let now = Utc::now();
        self.enforce_cooldown(&identity, point.id, now).await?;

        match self.insert_record(&identity, point, now, qr_value.as_deref()).await {
            Ok(response) => Ok(response),
            // A concurrent writer can briefly hold the file lock; one retry
            Err(PatrolError::Database(e)) if is_busy(&e) => {
                self.insert_record(&identity, point, now, qr_value.as_deref())
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn enforce_cooldown(
        &self,
        identity: &CheckinIdentity,
        point_id: i64,
        now: DateTime<Utc>,
    ) -> PatrolResult<()> {
        if self.cooldown_seconds <= 0 {
            return Ok(());
        }

        let last: Option<DateTime<Utc>> = match identity {
            CheckinIdentity::Binding(device) => sqlx::query(
                r#"
                SELECT checkin_at FROM checkin_records
                WHERE device_binding_id = ? AND point_id = ?
                ORDER BY checkin_at DESC LIMIT 1
                "#,
            )
            .bind(device.binding_id)
            .bind(point_id)
            .fetch_optional(&self.db)
            .await?
            .map(|row| row.get("checkin_at")),
            CheckinIdentity::Employee(employee) => sqlx::query(
                r#"
                SELECT checkin_at FROM checkin_records
                WHERE employee_id = ? AND point_id = ?
                ORDER BY checkin_at DESC LIMIT 1
                "#,
            )
            .bind(employee.id)
            .bind(point_id)
            .fetch_optional(&self.db)
            .await?
            .map(|row| row.get("checkin_at")),
        };

        if let Some(last_scan_at) = last {
            let window = Duration::seconds(self.cooldown_seconds);
            let elapsed = now - last_scan_at;
            if elapsed < window {
                let remaining = (window - elapsed).num_seconds().max(1);
                tracing::debug!(
                    "Cooldown rejection for point {} ({}s remaining)",
                    point_id, remaining
                );
                return Err(PatrolError::Cooldown {
                    cooldown_seconds: remaining,
                    last_scan_at,
                });
            }
        }

        Ok(())
    }

    async fn insert_record(
        &self,
        identity: &CheckinIdentity,
        point: &PatrolPoint,
        now: DateTime<Utc>,
        qr_value: Option<&str>,
    ) -> PatrolResult<CheckinResponse> {
        let (binding_id, employee_id, employee_name, site_name, device_info) = match identity {
            CheckinIdentity::Binding(device) => (
                Some(device.binding_id),
                None,
                device.employee_name.clone(),
                device.site_name.clone(),
                device.fingerprint_json.clone(),
            ),
            CheckinIdentity::Employee(employee) => (
                None,
                Some(employee.id),
                employee.name.clone(),
                point.site_name.clone().unwrap_or_default(),
                None,
            ),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO checkin_records (
                device_binding_id, employee_id, point_id, employee_name,
                site_name, point_code, point_name, checkin_at, qr_value,
                device_info, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(binding_id)
        .bind(employee_id)
        .bind(point.id)
        .bind(&employee_name)
        .bind(&site_name)
        .bind(&point.point_code)
        .bind(&point.point_name)
        .bind(now)
        .bind(qr_value)
        .bind(&device_info)
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::info!(
            "Check-in: {} at {} ({})",
            employee_name, point.point_code, point.point_name
        );

        Ok(CheckinResponse {
            id: result.last_insert_rowid(),
            employee_id,
            employee_name,
            site_name,
            point_code: point.point_code.clone(),
            point_name: point.point_name.clone(),
            checkin_at: now,
            checkin_period: period_label(now),
            created_at: now,
        })
    }

    /// Newest-first record listing for the admin console
    pub async fn list_records(&self, query: RecordQuery) -> PatrolResult<Vec<CheckinResponse>> {
        let limit = query.limit.unwrap_or(100).clamp(1, 1000);

        let mut builder = QueryBuilder::new("SELECT * FROM checkin_records WHERE 1 = 1");
        if let Some(start) = query.start_date {
            builder
                .push(" AND checkin_at >= ")
                .push_bind(start.and_hms_opt(0, 0, 0).map(|t| t.and_utc()));
        }
        if let Some(end) = query.end_date {
            let next_day = end + Duration::days(1);
            builder
                .push(" AND checkin_at < ")
                .push_bind(next_day.and_hms_opt(0, 0, 0).map(|t| t.and_utc()));
        }
        if let Some(name) = query
            .employee_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            builder.push(" AND employee_name LIKE ").push_bind(format!("%{}%", name));
        }
        if let Some(site) = query
            .site_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            builder.push(" AND site_name LIKE ").push_bind(format!("%{}%", site));
        }
        if let Some(code) = query
            .point_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            builder.push(" AND point_code = ").push_bind(code.to_string());
        }
        builder.push(" ORDER BY checkin_at DESC LIMIT ").push_bind(limit);

        let records = builder
            .build_query_as::<CheckinRecord>()
            .fetch_all(&self.db)
            .await?;

        Ok(records
            .into_iter()
            .map(|r| CheckinResponse {
                id: r.id,
                employee_id: r.employee_id,
                employee_name: r.employee_name,
                site_name: r.site_name,
                point_code: r.point_code,
                point_name: r.point_name,
                checkin_at: r.checkin_at,
                checkin_period: period_label(r.checkin_at),
                created_at: r.created_at,
            })
            .collect())
    }
}

/// AM/PM display label in local wall time
fn period_label(at: DateTime<Utc>) -> String {
    let hour = match FixedOffset::east_opt(DISPLAY_UTC_OFFSET_SECS) {
        Some(offset) => at.with_timezone(&offset).hour(),
        None => at.hour(),
    };
    if hour < 12 {
        "上午".to_string()
    } else {
        "下午".to_string()
    }
}

fn is_busy(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.message().contains("locked")
        || db.message().contains("busy"))
}
