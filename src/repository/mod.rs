//! Repository layer: the persistence contract used by the scheduling core
//!
//! Services only see [`RotationStore`]. Every multi-row write is a single
//! method so implementations can make it atomic, and every mutable row is
//! guarded by its version stamp.

pub mod equipment;
pub mod memory;
pub mod rental_requests;
pub mod rollover;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{
        District, DistrictEquipmentType, DistrictRolloverStatus, Equipment, HistoryRecord,
        LocalArea, LocalAreaRotationList, OfferResponse, RentalAgreement, RentalRequest,
        RentalRequestStatus, RolloverProgress, RotationListEntry, SeniorityAssignment,
    },
};

pub use memory::MemoryRepository;

/// Shared handle to the store used by all services
pub type Repository = Arc<dyn RotationStore>;

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

/// Rental request to insert together with its generated queue
#[derive(Debug, Clone)]
pub struct NewRentalRequest {
    pub project_id: Option<i32>,
    pub local_area_id: i32,
    pub district_equipment_type_id: i32,
    pub equipment_count: i32,
    pub status: RentalRequestStatus,
    pub expected_hours: Option<f64>,
    pub expected_start_date: Option<NaiveDate>,
    pub expected_end_date: Option<NaiveDate>,
    pub first_on_rotation_list: Option<i32>,
    pub history: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRotationEntry {
    pub equipment_id: i32,
    pub block_number: Option<i32>,
    pub rotation_list_sort_order: i32,
}

/// Version-checked update of a rental request's editable fields
#[derive(Debug, Clone)]
pub struct RentalRequestUpdate {
    pub id: i32,
    pub expected_version: i32,
    pub equipment_count: i32,
    pub expected_hours: Option<f64>,
    pub expected_start_date: Option<NaiveDate>,
    pub expected_end_date: Option<NaiveDate>,
    pub status: RentalRequestStatus,
    pub first_on_rotation_list: Option<i32>,
    pub history: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRentalAgreement {
    pub equipment_id: i32,
    pub project_id: Option<i32>,
    pub local_area_id: i32,
    pub fiscal_year: i32,
    pub estimate_hours: Option<f64>,
    pub estimate_start_work: Option<NaiveDate>,
    pub dated_on: DateTime<Utc>,
}

/// New position of the shared rotation pointer
#[derive(Debug, Clone, PartialEq)]
pub struct PointerAdvance {
    pub local_area_id: i32,
    pub district_equipment_type_id: i32,
    /// `None` when no pointer row exists yet for the pair
    pub expected_version: Option<i32>,
    pub current_block: Option<i32>,
    pub next_equipment_id: Option<i32>,
    pub last_asked_equipment_id: i32,
}

/// Everything one offer response writes, committed atomically
#[derive(Debug, Clone)]
pub struct OfferCommit {
    pub request_id: i32,
    pub request_version: i32,
    pub entry_id: i32,
    pub entry_version: i32,
    pub offer_response: Option<OfferResponse>,
    pub is_force_hire: bool,
    pub asked_date_time: DateTime<Utc>,
    pub offer_response_datetime: DateTime<Utc>,
    pub offer_refusal_reason: Option<String>,
    pub offer_response_note: Option<String>,
    pub note: Option<String>,
    pub agreement: Option<NewRentalAgreement>,
    pub request_status: RentalRequestStatus,
    pub first_on_rotation_list: Option<i32>,
    pub pointer: Option<PointerAdvance>,
    pub history: Vec<String>,
}

/// Marks a district rollover as started (or resumed)
#[derive(Debug, Clone)]
pub struct RolloverKickoff {
    pub district_id: i32,
    pub target_fiscal_year: i32,
    pub job_id: Uuid,
    pub scoring_rules: serde_json::Value,
    /// Keep the existing checkpoint instead of starting from scratch
    pub resume: bool,
    pub started_at: DateTime<Utc>,
}

/// One local area's new seniority snapshot plus its checkpoint
#[derive(Debug, Clone)]
pub struct LocalAreaBatch {
    pub district_id: i32,
    pub local_area_id: i32,
    pub fiscal_year: i32,
    pub assignments: Vec<SeniorityAssignment>,
    pub progress_percentage: i32,
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RotationStore: Send + Sync {
    // ---- Reference data ----
    async fn get_district(&self, id: i32) -> AppResult<Option<District>>;
    async fn get_local_area(&self, id: i32) -> AppResult<Option<LocalArea>>;
    /// Local areas of a district, ordered by id
    async fn list_local_areas(&self, district_id: i32) -> AppResult<Vec<LocalArea>>;
    async fn get_district_equipment_type(&self, id: i32)
        -> AppResult<Option<DistrictEquipmentType>>;

    // ---- Equipment ----
    /// All equipment (any status) of one (local area, equipment type)
    async fn list_equipment(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Vec<Equipment>>;
    /// All equipment (any status) of one local area
    async fn list_local_area_equipment(&self, local_area_id: i32) -> AppResult<Vec<Equipment>>;

    // ---- Rotation pointer ----
    async fn get_rotation_pointer(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<LocalAreaRotationList>>;

    // ---- Rental requests ----
    async fn get_rental_request(&self, id: i32) -> AppResult<Option<RentalRequest>>;
    /// Entries ordered by `rotation_list_sort_order`
    async fn list_rotation_entries(&self, rental_request_id: i32)
        -> AppResult<Vec<RotationListEntry>>;
    async fn find_in_progress_request(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<i32>>;
    async fn count_request_agreements(&self, rental_request_id: i32) -> AppResult<i64>;
    async fn list_request_history(&self, rental_request_id: i32) -> AppResult<Vec<HistoryRecord>>;
    async fn list_request_agreements(&self, rental_request_id: i32)
        -> AppResult<Vec<RentalAgreement>>;
    /// Inserts the request and its queue; rejects a second In Progress
    /// request for the same pair.
    async fn create_rental_request(
        &self,
        request: NewRentalRequest,
        entries: Vec<NewRotationEntry>,
    ) -> AppResult<RentalRequest>;
    async fn update_rental_request(&self, update: RentalRequestUpdate) -> AppResult<RentalRequest>;
    /// Applies an offer response; returns the agreement it created, if any
    async fn record_offer(&self, commit: OfferCommit) -> AppResult<Option<RentalAgreement>>;
    /// Deletes a request with its entries, notes, attachments and history
    async fn delete_rental_request(&self, id: i32, expected_version: i32) -> AppResult<()>;

    // ---- Rollover ----
    async fn get_rollover_status(&self, district_id: i32)
        -> AppResult<Option<DistrictRolloverStatus>>;
    async fn get_rollover_progress(&self, district_id: i32) -> AppResult<Option<RolloverProgress>>;
    async fn list_unfinished_rollovers(&self) -> AppResult<Vec<RolloverProgress>>;
    async fn begin_rollover(&self, kickoff: RolloverKickoff) -> AppResult<()>;
    /// Writes one local area's assignments and advances the checkpoint, or
    /// writes nothing.
    async fn save_local_area_batch(&self, batch: LocalAreaBatch) -> AppResult<()>;
    /// Flips the district's fiscal years and clears the checkpoint
    async fn complete_rollover(
        &self,
        district_id: i32,
        target_fiscal_year: i32,
    ) -> AppResult<DistrictRolloverStatus>;
    async fn record_rollover_failure(&self, district_id: i32, message: String) -> AppResult<()>;
    /// Clears the banner only when the flag is set and progress is 100
    async fn dismiss_rollover_message(
        &self,
        district_id: i32,
    ) -> AppResult<Option<DistrictRolloverStatus>>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

/// PostgreSQL store; each atomic write runs in one transaction
#[derive(Clone)]
pub struct PgRepository {
    pub pool: Pool<Postgres>,
}

impl PgRepository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Maps unique-index violations to the conflict they stand for
pub(crate) fn map_unique_violation(err: sqlx::Error, code: ErrorCode, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(code, message),
        _ => AppError::Database(err),
    }
}

#[async_trait]
impl RotationStore for PgRepository {
    async fn get_district(&self, id: i32) -> AppResult<Option<District>> {
        self.districts_get(id).await
    }

    async fn get_local_area(&self, id: i32) -> AppResult<Option<LocalArea>> {
        self.local_areas_get(id).await
    }

    async fn list_local_areas(&self, district_id: i32) -> AppResult<Vec<LocalArea>> {
        self.local_areas_list(district_id).await
    }

    async fn get_district_equipment_type(
        &self,
        id: i32,
    ) -> AppResult<Option<DistrictEquipmentType>> {
        self.equipment_types_get(id).await
    }

    async fn list_equipment(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Vec<Equipment>> {
        self.equipment_list_for_pair(local_area_id, district_equipment_type_id)
            .await
    }

    async fn list_local_area_equipment(&self, local_area_id: i32) -> AppResult<Vec<Equipment>> {
        self.equipment_list_for_local_area(local_area_id).await
    }

    async fn get_rotation_pointer(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<LocalAreaRotationList>> {
        self.rotation_pointer_get(local_area_id, district_equipment_type_id)
            .await
    }

    async fn get_rental_request(&self, id: i32) -> AppResult<Option<RentalRequest>> {
        self.rental_requests_get(id).await
    }

    async fn list_rotation_entries(
        &self,
        rental_request_id: i32,
    ) -> AppResult<Vec<RotationListEntry>> {
        self.rental_requests_list_entries(rental_request_id).await
    }

    async fn find_in_progress_request(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<i32>> {
        self.rental_requests_find_in_progress(local_area_id, district_equipment_type_id)
            .await
    }

    async fn count_request_agreements(&self, rental_request_id: i32) -> AppResult<i64> {
        self.rental_requests_count_agreements(rental_request_id).await
    }

    async fn list_request_history(&self, rental_request_id: i32) -> AppResult<Vec<HistoryRecord>> {
        self.rental_requests_list_history(rental_request_id).await
    }

    async fn list_request_agreements(
        &self,
        rental_request_id: i32,
    ) -> AppResult<Vec<RentalAgreement>> {
        self.rental_requests_list_agreements(rental_request_id).await
    }

    async fn create_rental_request(
        &self,
        request: NewRentalRequest,
        entries: Vec<NewRotationEntry>,
    ) -> AppResult<RentalRequest> {
        self.rental_requests_create(request, entries).await
    }

    async fn update_rental_request(&self, update: RentalRequestUpdate) -> AppResult<RentalRequest> {
        self.rental_requests_update(update).await
    }

    async fn record_offer(&self, commit: OfferCommit) -> AppResult<Option<RentalAgreement>> {
        self.rental_requests_record_offer(commit).await
    }

    async fn delete_rental_request(&self, id: i32, expected_version: i32) -> AppResult<()> {
        self.rental_requests_delete(id, expected_version).await
    }

    async fn get_rollover_status(
        &self,
        district_id: i32,
    ) -> AppResult<Option<DistrictRolloverStatus>> {
        self.rollover_get_status(district_id).await
    }

    async fn get_rollover_progress(&self, district_id: i32) -> AppResult<Option<RolloverProgress>> {
        self.rollover_get_progress(district_id).await
    }

    async fn list_unfinished_rollovers(&self) -> AppResult<Vec<RolloverProgress>> {
        self.rollover_list_unfinished().await
    }

    async fn begin_rollover(&self, kickoff: RolloverKickoff) -> AppResult<()> {
        self.rollover_begin(kickoff).await
    }

    async fn save_local_area_batch(&self, batch: LocalAreaBatch) -> AppResult<()> {
        self.rollover_save_batch(batch).await
    }

    async fn complete_rollover(
        &self,
        district_id: i32,
        target_fiscal_year: i32,
    ) -> AppResult<DistrictRolloverStatus> {
        self.rollover_complete(district_id, target_fiscal_year).await
    }

    async fn record_rollover_failure(&self, district_id: i32, message: String) -> AppResult<()> {
        self.rollover_record_failure(district_id, &message).await
    }

    async fn dismiss_rollover_message(
        &self,
        district_id: i32,
    ) -> AppResult<Option<DistrictRolloverStatus>> {
        self.rollover_dismiss_message(district_id).await
    }
}
