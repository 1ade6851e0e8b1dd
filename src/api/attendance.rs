use actix_web::{HttpResponse, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::Engine;
use crate::engine::stats::TodayStats;
use crate::error::AppError;
use crate::model::attendance::AttendanceRecord;
use crate::models::{ActiveQuery, LogsQuery};

#[derive(Serialize, ToSchema)]
pub struct ActiveResponse {
    pub active: Vec<AttendanceRecord>,
}

#[derive(Serialize, ToSchema)]
pub struct LogsResponse {
    pub logs: Vec<AttendanceRecord>,
}

#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    pub stats: TodayStats,
}

/// Employees currently IN
#[utoipa::path(
    get,
    path = "/api/active",
    params(ActiveQuery),
    responses(
        (status = 200, description = "Open sessions, newest first", body = ActiveResponse),
        (status = 503, description = "Store unavailable")
    ),
    tag = "Attendance"
)]
pub async fn active_sessions(
    engine: web::Data<Engine>,
    query: web::Query<ActiveQuery>,
) -> Result<HttpResponse, AppError> {
    let active = engine.active_sessions(query.location_id).await?;
    Ok(HttpResponse::Ok().json(ActiveResponse { active }))
}

/// Attendance history
#[utoipa::path(
    get,
    path = "/api/logs",
    params(LogsQuery),
    responses(
        (status = 200, description = "Sessions, newest first", body = LogsResponse),
        (status = 503, description = "Store unavailable")
    ),
    tag = "Attendance"
)]
pub async fn attendance_logs(
    engine: web::Data<Engine>,
    query: web::Query<LogsQuery>,
) -> Result<HttpResponse, AppError> {
    let logs = engine
        .attendance_history(query.limit, query.employee_id)
        .await?;
    Ok(HttpResponse::Ok().json(LogsResponse { logs }))
}

/// Today's totals
#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "Totals for the current local day", body = StatsResponse, example = json!({
            "stats": {"total_entries": 12, "active_now": 4, "completed": 8}
        })),
        (status = 503, description = "Store unavailable")
    ),
    tag = "Attendance"
)]
pub async fn today_stats(engine: web::Data<Engine>) -> Result<HttpResponse, AppError> {
    let stats = engine.today_stats().await?;
    Ok(HttpResponse::Ok().json(StatsResponse { stats }))
}
