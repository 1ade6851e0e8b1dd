use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "epc_code": "E2801160600002084D5A2B11",
        "full_name": "Budi Santoso",
        "office": "Jakarta HQ",
        "position": "Operator",
        "address": "Jl. Sudirman 1"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    /// Uppercase hex EPC written on the employee's badge. Unique.
    #[schema(example = "E2801160600002084D5A2B11")]
    pub epc_code: String,

    #[schema(example = "Budi Santoso")]
    pub full_name: String,

    #[schema(example = "Jakarta HQ", nullable = true)]
    pub office: Option<String>,

    #[schema(example = "Operator", nullable = true)]
    pub position: Option<String>,

    #[schema(example = "Jl. Sudirman 1", nullable = true)]
    pub address: Option<String>,
}

/// The slice of an employee that travels inside a scan event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmployeeSummary {
    pub id: u64,
    pub full_name: String,
    pub office: Option<String>,
    pub position: Option<String>,
}

impl From<&Employee> for EmployeeSummary {
    fn from(employee: &Employee) -> Self {
        Self {
            id: employee.id,
            full_name: employee.full_name.clone(),
            office: employee.office.clone(),
            position: employee.position.clone(),
        }
    }
}

/// A registration that already passed validation; see `models::RegisterEmployee`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmployee {
    pub epc_code: String,
    pub full_name: String,
    pub office: Option<String>,
    pub position: Option<String>,
    pub address: Option<String>,
}
