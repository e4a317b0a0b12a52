//! Equipment model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::enums::EquipmentStatus;

/// Hired equipment record with its seniority snapshot
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Equipment {
    pub id: i32,
    /// Equipment code shown to users (e.g. "EX-0042")
    pub equipment_code: String,
    pub owner_id: Option<i32>,
    pub local_area_id: i32,
    pub district_equipment_type_id: i32,
    pub status: EquipmentStatus,
    /// Date the equipment was registered; first seniority tie breaker
    pub received_date: Option<NaiveDate>,
    pub years_of_service: f64,
    pub service_hours_last_year: f64,
    pub service_hours_two_years_ago: f64,
    pub service_hours_three_years_ago: f64,
    /// Years the owner has been registered (joined from the owner record)
    pub owner_years_registered: f64,
    // Seniority snapshot, valid for `seniority_fiscal_year` only
    pub seniority: Option<f64>,
    pub block_number: Option<i32>,
    pub block_position: Option<i32>,
    pub number_of_blocks: Option<i32>,
    pub seniority_fiscal_year: Option<i32>,
    /// Optimistic concurrency stamp
    pub version: i32,
}

/// New seniority/block values for one equipment, written by rollover
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeniorityAssignment {
    pub equipment_id: i32,
    /// Version the rollover read; the write is rejected if it moved
    pub expected_version: i32,
    pub seniority: f64,
    pub rank: i32,
    pub block_number: i32,
    pub block_position: i32,
    pub number_of_blocks: i32,
}
