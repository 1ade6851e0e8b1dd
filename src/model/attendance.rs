use chrono::{Duration, NaiveDateTime};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum_macros::Display,
    EnumString,
    AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    In,
    Completed,
}

/// Presence is tracked per (employee, location). At most one session per key is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display(fmt = "employee {} @ location {}", employee_id, location_id)]
pub struct SessionKey {
    pub employee_id: u64,
    pub location_id: u64,
}

impl SessionKey {
    pub fn new(employee_id: u64, location_id: u64) -> Self {
        Self {
            employee_id,
            location_id,
        }
    }
}

/// One IN -> OUT cycle at one location. Closed at most once, never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSession {
    pub id: u64,
    pub employee_id: u64,
    pub location_id: u64,
    pub time_in: NaiveDateTime,
    pub time_out: Option<NaiveDateTime>,
    pub status: SessionStatus,
}

impl AttendanceSession {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.employee_id, self.location_id)
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::In
    }

    /// `time_out - time_in` once completed. Never stored.
    pub fn duration(&self) -> Option<Duration> {
        match (self.status, self.time_out) {
            (SessionStatus::Completed, Some(out)) => Some(out - self.time_in),
            _ => None,
        }
    }
}

/// Session joined with its employee and location, as served to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    pub location_id: u64,
    #[schema(value_type = String, format = DateTime, example = "2026-10-16T09:00:00")]
    pub time_in: NaiveDateTime,
    #[schema(value_type = Option<String>, format = DateTime, example = "2026-10-16T10:30:00")]
    pub time_out: Option<NaiveDateTime>,
    pub status: SessionStatus,
    #[schema(example = 5400)]
    pub duration_seconds: Option<i64>,
    pub full_name: String,
    pub epc_code: String,
    pub office: Option<String>,
    pub position: Option<String>,
    pub area_name: String,
}

impl AttendanceRecord {
    pub fn from_session(
        session: &AttendanceSession,
        employee: &super::employee::Employee,
        area_name: &str,
    ) -> Self {
        Self {
            id: session.id,
            employee_id: session.employee_id,
            location_id: session.location_id,
            time_in: session.time_in,
            time_out: session.time_out,
            status: session.status,
            duration_seconds: session.duration().map(|d| d.num_seconds()),
            full_name: employee.full_name.clone(),
            epc_code: employee.epc_code.clone(),
            office: employee.office.clone(),
            position: employee.position.clone(),
            area_name: area_name.to_string(),
        }
    }
}
