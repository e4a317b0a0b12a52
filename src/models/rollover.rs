//! District rollover status and checkpoint models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;

/// Per-district fiscal year and rollover banner state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DistrictRolloverStatus {
    pub district_id: i32,
    pub current_fiscal_year: i32,
    pub next_fiscal_year: i32,
    /// 0-100 while running or finished, `None` when idle
    pub progress_percentage: Option<i32>,
    pub display_rollover_message: bool,
    pub rollover_start_date: Option<DateTime<Utc>>,
    pub rollover_end_date: Option<DateTime<Utc>>,
}

impl DistrictRolloverStatus {
    /// A rollover counts as active once it has progress or a banner up
    pub fn is_active(&self) -> bool {
        self.display_rollover_message || self.progress_percentage.map_or(false, |p| p > 0)
    }
}

/// Resumable checkpoint of a district's rollover job
#[derive(Debug, Clone, FromRow)]
pub struct RolloverProgress {
    pub district_id: i32,
    /// Fiscal year being rolled into; `None` once the job finished
    pub target_fiscal_year: Option<i32>,
    pub progress_percentage: Option<i32>,
    /// Highest local area id whose assignments are committed
    pub last_processed_local_area_id: Option<i32>,
    /// Rules the job started with, reused on resume
    pub scoring_rules: Json<serde_json::Value>,
    pub job_id: Option<Uuid>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RolloverProgress {
    /// Checkpoint left behind by a job that never reached completion
    pub fn is_unfinished(&self) -> bool {
        self.target_fiscal_year.is_some()
    }
}

/// Rollover status returned to pollers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RolloverStatusView {
    pub district_id: i32,
    pub progress_percentage: Option<i32>,
    pub current_fiscal_year: i32,
    pub next_fiscal_year: i32,
    pub display_message: bool,
    /// A job for this district is live in this process
    pub job_running: bool,
    pub last_error: Option<String>,
}

/// Response to a rollover start
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RolloverStarted {
    pub job_id: Uuid,
    pub district_id: i32,
    pub target_fiscal_year: i32,
    /// Whether the job picked up an earlier checkpoint
    pub resumed: bool,
}
