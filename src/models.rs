use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::{IntoParams, ToSchema};

use crate::model::employee::NewEmployee;
use crate::model::scan::normalize_epc;

const MAX_EPC_LEN: usize = 64;
const MAX_TEXT_LEN: usize = 255;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("EPC code and full name are required")]
    MissingField,

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("EPC required")]
    MissingEpc,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RegisterEmployeeReq {
    #[schema(example = "E2801160600002084D5A2B11")]
    pub epc_code: Option<String>,
    #[schema(example = "Budi Santoso")]
    pub full_name: Option<String>,
    #[schema(example = "Jakarta HQ")]
    pub office: Option<String>,
    #[schema(example = "Operator")]
    pub position: Option<String>,
    #[schema(example = "Jl. Sudirman 1")]
    pub address: Option<String>,
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn bounded(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

impl RegisterEmployeeReq {
    pub fn validate(self) -> Result<NewEmployee, ValidationError> {
        let epc_code = optional(self.epc_code).map(|epc| normalize_epc(&epc));
        let full_name = optional(self.full_name);
        let (Some(epc_code), Some(full_name)) = (epc_code, full_name) else {
            return Err(ValidationError::MissingField);
        };

        let office = optional(self.office);
        let position = optional(self.position);
        let address = optional(self.address);

        bounded("epc_code", &epc_code, MAX_EPC_LEN)?;
        bounded("full_name", &full_name, MAX_TEXT_LEN)?;
        for (field, value) in [("office", &office), ("position", &position), ("address", &address)] {
            if let Some(value) = value {
                bounded(field, value, MAX_TEXT_LEN)?;
            }
        }

        Ok(NewEmployee {
            epc_code,
            full_name,
            office,
            position,
            address,
        })
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SimulateScanReq {
    #[schema(example = "AAA")]
    pub epc: String,
    #[schema(example = 1)]
    #[serde(default = "default_antenna")]
    pub antenna: u16,
}

fn default_antenna() -> u16 {
    1
}

impl SimulateScanReq {
    /// Normalized epc, or `MissingEpc`.
    pub fn epc(&self) -> Result<String, ValidationError> {
        let epc = normalize_epc(&self.epc);
        if epc.is_empty() {
            return Err(ValidationError::MissingEpc);
        }
        bounded("epc", &epc, MAX_EPC_LEN)?;
        Ok(epc)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ActiveQuery {
    /// Only sessions at this location
    pub location_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LogsQuery {
    /// Maximum rows, default 100
    pub limit: Option<u32>,
    /// Only this employee's sessions
    pub employee_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(epc: Option<&str>, name: Option<&str>) -> RegisterEmployeeReq {
        RegisterEmployeeReq {
            epc_code: epc.map(Into::into),
            full_name: name.map(Into::into),
            office: Some("  ".into()),
            position: Some(" Operator ".into()),
            address: None,
        }
    }

    #[test]
    fn registration_normalizes_fields() {
        let new = req(Some(" e280ab "), Some(" Ana ")).validate().unwrap();
        assert_eq!(new.epc_code, "E280AB");
        assert_eq!(new.full_name, "Ana");
        assert_eq!(new.office, None);
        assert_eq!(new.position.as_deref(), Some("Operator"));
    }

    #[test]
    fn registration_requires_epc_and_name() {
        assert_eq!(
            req(None, Some("Ana")).validate(),
            Err(ValidationError::MissingField)
        );
        assert_eq!(
            req(Some("   "), Some("Ana")).validate(),
            Err(ValidationError::MissingField)
        );
        assert_eq!(
            req(Some("AAA"), None).validate(),
            Err(ValidationError::MissingField)
        );
    }

    #[test]
    fn overlong_fields_are_rejected() {
        let long = "A".repeat(65);
        assert_eq!(
            req(Some(&long), Some("Ana")).validate(),
            Err(ValidationError::TooLong {
                field: "epc_code",
                max: 64
            })
        );
    }

    #[test]
    fn simulate_requires_an_epc() {
        let blank = SimulateScanReq {
            epc: " ".into(),
            antenna: 1,
        };
        assert_eq!(blank.epc(), Err(ValidationError::MissingEpc));

        let ok = SimulateScanReq {
            epc: "zzz".into(),
            antenna: 2,
        };
        assert_eq!(ok.epc().unwrap(), "ZZZ");
    }
}
