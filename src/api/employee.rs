use actix_web::{HttpResponse, web};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::engine::Engine;
use crate::error::AppError;
use crate::model::employee::Employee;
use crate::models::RegisterEmployeeReq;
use crate::store::StoreError;

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub employees: Vec<Employee>,
}

#[derive(Serialize, ToSchema)]
pub struct RegisteredResponse {
    #[schema(example = true)]
    pub success: bool,
    pub employee: Employee,
}

/// Registered employees
#[utoipa::path(
    get,
    path = "/api/employees",
    responses(
        (status = 200, description = "All employees ordered by name", body = EmployeeListResponse),
        (status = 503, description = "Store unavailable")
    ),
    tag = "Employee"
)]
pub async fn list_employees(engine: web::Data<Engine>) -> Result<HttpResponse, AppError> {
    let employees = engine.employees().await?;
    Ok(HttpResponse::Ok().json(EmployeeListResponse { employees }))
}

/// Register an employee badge
#[utoipa::path(
    post,
    path = "/api/employees/register",
    request_body = RegisterEmployeeReq,
    responses(
        (status = 201, description = "Employee created", body = RegisteredResponse),
        (status = 400, description = "Missing or invalid fields", body = Object, example = json!({
            "error": "EPC code and full name are required"
        })),
        (status = 409, description = "EPC code already registered", body = Object, example = json!({
            "error": "EPC code already registered"
        })),
        (status = 503, description = "Store unavailable")
    ),
    tag = "Employee"
)]
pub async fn register_employee(
    engine: web::Data<Engine>,
    payload: web::Json<RegisterEmployeeReq>,
) -> Result<HttpResponse, AppError> {
    let new = payload.into_inner().validate()?;
    let epc = new.epc_code.clone();

    match engine.register_employee(new).await {
        Ok(employee) => Ok(HttpResponse::Created().json(RegisteredResponse {
            success: true,
            employee,
        })),
        Err(StoreError::Conflict(_)) => {
            Err(AppError::Conflict("EPC code already registered".into()))
        }
        Err(e) => {
            error!(error = %e, epc = %epc, "Failed to register employee");
            Err(e.into())
        }
    }
}
