use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A monitored area. Each reader antenna port maps to exactly one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Location {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 1)]
    pub antenna_port: u16,

    #[schema(example = "Production")]
    pub area_name: String,
}
