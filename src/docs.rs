use crate::api::attendance::{ActiveResponse, LogsResponse, StatsResponse};
use crate::api::employee::{EmployeeListResponse, RegisteredResponse};
use crate::api::location::LocationListResponse;
use crate::api::scan::{ClearedResponse, EventsResponse, SimulateResponse, StatusResponse};
use crate::engine::hub::LiveSnapshot;
use crate::engine::stats::TodayStats;
use crate::model::attendance::{AttendanceRecord, SessionStatus};
use crate::model::employee::{Employee, EmployeeSummary};
use crate::model::location::Location;
use crate::model::scan::{ScanAction, ScanEvent};
use crate::models::{RegisterEmployeeReq, SimulateScanReq};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Timeroom API",
        version = "0.1.0",
        description = r#"
## RFID Attendance Engine

Turns a stream of UHF RFID badge reads into per-area attendance sessions.

### Key Features
- **Live scans**
  - A reader is polled continuously. Repeated reads of one badge at one antenna inside the debounce window count once.
  - Each accepted read toggles the employee's session at that antenna's area: first read checks IN, the next checks OUT.
- **Dashboards**
  - `GET /ws` upgrades to a WebSocket. The first message is an `init` snapshot, followed by
    `scan_event`, `active_employees` and `stats` pushes.
  - Send `{"command": "get_active" | "get_logs" | "get_stats" | "get_employees" | "get_locations" | "get_events"}`
    to query over the same socket.
- **Attendance queries**
  - Active sessions, history, today's totals
- **Employees**
  - Badge registration

### Response Format
- JSON. Errors are `{"error": "..."}`.
- Timestamps are local time without offset.
"#,
    ),
    paths(
        crate::api::scan::status,
        crate::api::scan::recent_events,
        crate::api::scan::simulate_scan,
        crate::api::scan::clear_events,

        crate::api::attendance::active_sessions,
        crate::api::attendance::attendance_logs,
        crate::api::attendance::today_stats,

        crate::api::employee::list_employees,
        crate::api::employee::register_employee,

        crate::api::location::list_locations
    ),
    components(
        schemas(
            StatusResponse,
            EventsResponse,
            SimulateResponse,
            ClearedResponse,
            SimulateScanReq,
            ScanEvent,
            ScanAction,
            ActiveResponse,
            LogsResponse,
            StatsResponse,
            AttendanceRecord,
            SessionStatus,
            TodayStats,
            EmployeeListResponse,
            RegisteredResponse,
            RegisterEmployeeReq,
            Employee,
            EmployeeSummary,
            LocationListResponse,
            Location,
            LiveSnapshot
        )
    ),
    tags(
        (name = "Scan", description = "Reader status and scan events"),
        (name = "Attendance", description = "Attendance session queries"),
        (name = "Employee", description = "Employee badges"),
        (name = "Location", description = "Monitored areas"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/status",
            "/api/events",
            "/api/simulate",
            "/api/clear",
            "/api/active",
            "/api/logs",
            "/api/stats",
            "/api/employees",
            "/api/employees/register",
            "/api/locations",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
