use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;
use uuid::Uuid;

use super::employee::EmployeeSummary;
use super::location::Location;

/// One raw sighting of a tag by one antenna.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRead {
    pub epc: String,
    pub antenna_port: u16,
    pub observed_at: NaiveDateTime,
}

impl TagRead {
    pub fn new(epc: &str, antenna_port: u16, observed_at: NaiveDateTime) -> Self {
        Self {
            epc: normalize_epc(epc),
            antenna_port,
            observed_at,
        }
    }
}

/// EPC codes are compared uppercase with surrounding whitespace removed.
pub fn normalize_epc(epc: &str) -> String {
    epc.trim().to_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanAction {
    In,
    Out,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "id": "0b9c4f8e-61b4-4b6e-9f3e-1f1d2a3c4b5d",
        "timestamp": "2026-10-16T09:00:00",
        "action": "IN",
        "epc": "AAA",
        "antenna": 1,
        "employee": {"id": 1, "full_name": "Budi Santoso", "office": "Jakarta HQ", "position": "Operator"},
        "location": {"id": 1, "antenna_port": 1, "area_name": "Production"},
        "session_id": 42,
        "message": "Budi Santoso checked IN to Production"
    })
)]
pub struct ScanEvent {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: NaiveDateTime,
    pub action: ScanAction,
    pub epc: String,
    pub antenna: u16,
    pub employee: Option<EmployeeSummary>,
    pub location: Option<Location>,
    pub session_id: Option<u64>,
    pub message: String,
}

impl ScanEvent {
    pub fn unknown(read: &TagRead, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: read.observed_at,
            action: ScanAction::Unknown,
            epc: read.epc.clone(),
            antenna: read.antenna_port,
            employee: None,
            location: None,
            session_id: None,
            message,
        }
    }
}
