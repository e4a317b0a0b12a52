//! Local area rotation pointer

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// The shared "next to ask" pointer for one (local area, equipment type).
///
/// Every rental request for the pair starts its queue here, and every offer
/// response moves it past the equipment that answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LocalAreaRotationList {
    pub id: i32,
    pub local_area_id: i32,
    pub district_equipment_type_id: i32,
    pub current_block: Option<i32>,
    pub next_equipment_id: Option<i32>,
    pub last_asked_equipment_id: Option<i32>,
    pub version: i32,
}
