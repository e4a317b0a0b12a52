//! District, local area and equipment type reference data

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Administrative district; rollover runs per district
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct District {
    pub id: i32,
    pub name: String,
}

/// Local area inside a district; the unit of rollover checkpointing
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LocalArea {
    pub id: i32,
    pub district_id: i32,
    pub name: String,
}

/// Equipment type as configured for a district.
///
/// `number_of_blocks` and `is_dump_truck` come from the provincial
/// equipment type the district type points at.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DistrictEquipmentType {
    pub id: i32,
    pub district_id: i32,
    pub equipment_type_id: i32,
    pub name: String,
    pub number_of_blocks: i32,
    pub is_dump_truck: bool,
}
