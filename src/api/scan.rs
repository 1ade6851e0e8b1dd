use actix_web::{HttpResponse, web};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::engine::{Engine, Ingested};
use crate::error::AppError;
use crate::model::scan::ScanEvent;
use crate::models::SimulateScanReq;

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    #[schema(example = true)]
    pub connected: bool,
    #[schema(example = "http://192.168.1.100:8080")]
    pub reader: String,
    #[schema(example = 2)]
    pub websocket_clients: usize,
}

#[derive(Serialize, ToSchema)]
pub struct EventsResponse {
    pub events: Vec<ScanEvent>,
}

#[derive(Serialize, ToSchema)]
pub struct SimulateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<ScanEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ClearedResponse {
    #[schema(example = true)]
    pub success: bool,
}

/// Service status
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Reader address and live subscriber count", body = StatusResponse)
    ),
    tag = "Scan"
)]
pub async fn status(engine: web::Data<Engine>) -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        connected: true,
        reader: engine.reader_address().to_string(),
        websocket_clients: engine.hub().subscriber_count(),
    })
}

/// Recent scan events
#[utoipa::path(
    get,
    path = "/api/events",
    responses(
        (status = 200, description = "Recent events, newest first", body = EventsResponse)
    ),
    tag = "Scan"
)]
pub async fn recent_events(engine: web::Data<Engine>) -> HttpResponse {
    HttpResponse::Ok().json(EventsResponse {
        events: engine.recent_events(),
    })
}

/// Inject a scan without reader hardware
#[utoipa::path(
    post,
    path = "/api/simulate",
    request_body = SimulateScanReq,
    responses(
        (status = 200, description = "Scan processed, or suppressed by the dwell window", body = SimulateResponse),
        (status = 400, description = "EPC missing", body = Object, example = json!({
            "error": "EPC required"
        })),
        (status = 429, description = "Too many requests"),
        (status = 503, description = "Store unavailable")
    ),
    tag = "Scan"
)]
pub async fn simulate_scan(
    engine: web::Data<Engine>,
    payload: web::Json<SimulateScanReq>,
) -> Result<HttpResponse, AppError> {
    let epc = payload.epc()?;
    info!(epc = %epc, antenna = payload.antenna, "Simulated scan");

    match engine.simulate_scan(&epc, payload.antenna).await {
        Ingested::Forwarded(event) => Ok(HttpResponse::Ok().json(SimulateResponse {
            success: true,
            event: Some(event),
            message: None,
        })),
        Ingested::Suppressed => Ok(HttpResponse::Ok().json(SimulateResponse {
            success: false,
            event: None,
            message: Some("Duplicate read within the debounce window".into()),
        })),
        Ingested::Dropped => Err(AppError::Unavailable),
    }
}

/// Clear recent scan events
#[utoipa::path(
    post,
    path = "/api/clear",
    responses(
        (status = 200, description = "Recent events cleared", body = ClearedResponse)
    ),
    tag = "Scan"
)]
pub async fn clear_events(engine: web::Data<Engine>) -> HttpResponse {
    engine.clear_recent_events();
    info!("Recent events cleared");
    HttpResponse::Ok().json(ClearedResponse { success: true })
}
