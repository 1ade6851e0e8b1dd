use actix_web::{HttpResponse, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::Engine;
use crate::error::AppError;
use crate::model::location::Location;

#[derive(Serialize, ToSchema)]
pub struct LocationListResponse {
    pub locations: Vec<Location>,
}

/// Monitored areas
#[utoipa::path(
    get,
    path = "/api/locations",
    responses(
        (status = 200, description = "Locations ordered by antenna port", body = LocationListResponse),
        (status = 503, description = "Store unavailable")
    ),
    tag = "Location"
)]
pub async fn list_locations(engine: web::Data<Engine>) -> Result<HttpResponse, AppError> {
    let locations = engine.locations().await?;
    Ok(HttpResponse::Ok().json(LocationListResponse { locations }))
}
