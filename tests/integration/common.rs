//! Fixtures shared by the integration tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use hets_server::{
    config::{AppConfig, RolloverConfig},
    error::{AppError, AppResult},
    models::{
        District, DistrictEquipmentType, DistrictRolloverStatus, Equipment, EquipmentStatus,
        HistoryRecord, LocalArea, LocalAreaRotationList, RentalAgreement, RentalRequest,
        RolloverProgress, RolloverStarted, RotationListEntry,
    },
    repository::{
        LocalAreaBatch, MemoryRepository, NewRentalRequest, NewRotationEntry, OfferCommit,
        Repository, RentalRequestUpdate, RolloverKickoff, RotationStore,
    },
    services::{
        jobs::{JobHandle, JobProgress, JobState},
        Services,
    },
};

pub const DISTRICT: i32 = 1;
pub const OTHER_DISTRICT: i32 = 2;
pub const LOCAL_AREA: i32 = 10;
pub const SECOND_LOCAL_AREA: i32 = 11;
pub const OTHER_LOCAL_AREA: i32 = 20;
/// Two blocks, default scoring class
pub const EXCAVATOR: i32 = 100;
/// One block, dump truck scoring class
pub const DUMP_TRUCK: i32 = 200;

pub fn scoring_rules() -> Value {
    json!({
        "equipment_score": { "default": 60, "dump_truck": 600 },
        "max_years_of_service": { "default": 30 }
    })
}

pub fn test_config(retry_backoff_ms: u64) -> AppConfig {
    AppConfig {
        server: Default::default(),
        database: Default::default(),
        logging: Default::default(),
        rollover: RolloverConfig {
            max_batch_attempts: 3,
            retry_backoff_ms,
        },
        seniority_scoring_rules: scoring_rules(),
    }
}

pub fn equipment(id: i32, local_area_id: i32, type_id: i32, years: f64) -> Equipment {
    Equipment {
        id,
        equipment_code: format!("EQ-{:04}", id),
        owner_id: None,
        local_area_id,
        district_equipment_type_id: type_id,
        status: EquipmentStatus::Approved,
        received_date: None,
        years_of_service: years,
        service_hours_last_year: 0.0,
        service_hours_two_years_ago: 0.0,
        service_hours_three_years_ago: 0.0,
        owner_years_registered: 0.0,
        seniority: None,
        block_number: None,
        block_position: None,
        number_of_blocks: None,
        seniority_fiscal_year: None,
        version: 1,
    }
}

/// Equipment already ranked `rank` and dealt into two blocks
pub fn ranked_equipment(id: i32, rank: i32) -> Equipment {
    let mut e = equipment(id, LOCAL_AREA, EXCAVATOR, (10 - rank) as f64);
    e.seniority = Some(((10 - rank) * 60) as f64);
    e.block_number = Some((rank - 1) % 2 + 1);
    e.block_position = Some((rank - 1) / 2 + 1);
    e.number_of_blocks = Some(2);
    e.seniority_fiscal_year = Some(2025);
    e
}

pub fn rollover_status(district_id: i32, current_fiscal_year: i32) -> DistrictRolloverStatus {
    DistrictRolloverStatus {
        district_id,
        current_fiscal_year,
        next_fiscal_year: current_fiscal_year + 1,
        progress_percentage: None,
        display_rollover_message: false,
        rollover_start_date: None,
        rollover_end_date: None,
    }
}

/// Two districts with reference data and fiscal year 2025/2026, no equipment
pub fn seeded_repository() -> Arc<MemoryRepository> {
    let repo = Arc::new(MemoryRepository::new());

    for (id, name) in [(DISTRICT, "Lower Mainland"), (OTHER_DISTRICT, "Peace River")] {
        repo.insert_district(District {
            id,
            name: name.to_string(),
        });
        repo.insert_rollover_status(rollover_status(id, 2025));
    }
    for (id, district_id) in [
        (LOCAL_AREA, DISTRICT),
        (SECOND_LOCAL_AREA, DISTRICT),
        (OTHER_LOCAL_AREA, OTHER_DISTRICT),
    ] {
        repo.insert_local_area(LocalArea {
            id,
            district_id,
            name: format!("Local Area {}", id),
        });
    }
    repo.insert_equipment_type(DistrictEquipmentType {
        id: EXCAVATOR,
        district_id: DISTRICT,
        equipment_type_id: 1,
        name: "Excavator".to_string(),
        number_of_blocks: 2,
        is_dump_truck: false,
    });
    repo.insert_equipment_type(DistrictEquipmentType {
        id: DUMP_TRUCK,
        district_id: DISTRICT,
        equipment_type_id: 2,
        name: "Dump Truck".to_string(),
        number_of_blocks: 1,
        is_dump_truck: true,
    });

    repo
}

/// Five excavators in `LOCAL_AREA`, ranks 1..5 = ids 1..5, in two blocks
pub fn rotation_repository() -> Arc<MemoryRepository> {
    let repo = seeded_repository();
    for id in 1..=5 {
        repo.insert_equipment(ranked_equipment(id, id));
    }
    repo
}

pub fn services(repo: &Arc<MemoryRepository>, retry_backoff_ms: u64) -> Services {
    let repository: Repository = repo.clone();
    Services::new(repository, &test_config(retry_backoff_ms))
}

/// Services whose next `count` batch saves for `local_area_id` fail as if
/// the database connection dropped
pub fn flaky_services(repo: &Arc<MemoryRepository>, local_area_id: i32, count: u32) -> Services {
    let store = FlakyStore {
        inner: repo.clone(),
        failures: Mutex::new(HashMap::from([(local_area_id, count)])),
    };
    Services::new(Arc::new(store), &test_config(1))
}

/// Memory store with transient batch-save failures
pub struct FlakyStore {
    inner: Arc<MemoryRepository>,
    failures: Mutex<HashMap<i32, u32>>,
}

#[async_trait]
impl RotationStore for FlakyStore {
    async fn get_district(&self, id: i32) -> AppResult<Option<District>> {
        self.inner.get_district(id).await
    }

    async fn get_local_area(&self, id: i32) -> AppResult<Option<LocalArea>> {
        self.inner.get_local_area(id).await
    }

    async fn list_local_areas(&self, district_id: i32) -> AppResult<Vec<LocalArea>> {
        self.inner.list_local_areas(district_id).await
    }

    async fn get_district_equipment_type(
        &self,
        id: i32,
    ) -> AppResult<Option<DistrictEquipmentType>> {
        self.inner.get_district_equipment_type(id).await
    }

    async fn list_equipment(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Vec<Equipment>> {
        self.inner
            .list_equipment(local_area_id, district_equipment_type_id)
            .await
    }

    async fn list_local_area_equipment(&self, local_area_id: i32) -> AppResult<Vec<Equipment>> {
        self.inner.list_local_area_equipment(local_area_id).await
    }

    async fn get_rotation_pointer(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<LocalAreaRotationList>> {
        self.inner
            .get_rotation_pointer(local_area_id, district_equipment_type_id)
            .await
    }

    async fn get_rental_request(&self, id: i32) -> AppResult<Option<RentalRequest>> {
        self.inner.get_rental_request(id).await
    }

    async fn list_rotation_entries(
        &self,
        rental_request_id: i32,
    ) -> AppResult<Vec<RotationListEntry>> {
        self.inner.list_rotation_entries(rental_request_id).await
    }

    async fn find_in_progress_request(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<i32>> {
        self.inner
            .find_in_progress_request(local_area_id, district_equipment_type_id)
            .await
    }

    async fn count_request_agreements(&self, rental_request_id: i32) -> AppResult<i64> {
        self.inner.count_request_agreements(rental_request_id).await
    }

    async fn list_request_history(&self, rental_request_id: i32) -> AppResult<Vec<HistoryRecord>> {
        self.inner.list_request_history(rental_request_id).await
    }

    async fn list_request_agreements(
        &self,
        rental_request_id: i32,
    ) -> AppResult<Vec<RentalAgreement>> {
        self.inner.list_request_agreements(rental_request_id).await
    }

    async fn create_rental_request(
        &self,
        request: NewRentalRequest,
        entries: Vec<NewRotationEntry>,
    ) -> AppResult<RentalRequest> {
        self.inner.create_rental_request(request, entries).await
    }

    async fn update_rental_request(&self, update: RentalRequestUpdate) -> AppResult<RentalRequest> {
        self.inner.update_rental_request(update).await
    }

    async fn record_offer(&self, commit: OfferCommit) -> AppResult<Option<RentalAgreement>> {
        self.inner.record_offer(commit).await
    }

    async fn delete_rental_request(&self, id: i32, expected_version: i32) -> AppResult<()> {
        self.inner.delete_rental_request(id, expected_version).await
    }

    async fn get_rollover_status(
        &self,
        district_id: i32,
    ) -> AppResult<Option<DistrictRolloverStatus>> {
        self.inner.get_rollover_status(district_id).await
    }

    async fn get_rollover_progress(&self, district_id: i32) -> AppResult<Option<RolloverProgress>> {
        self.inner.get_rollover_progress(district_id).await
    }

    async fn list_unfinished_rollovers(&self) -> AppResult<Vec<RolloverProgress>> {
        self.inner.list_unfinished_rollovers().await
    }

    async fn begin_rollover(&self, kickoff: RolloverKickoff) -> AppResult<()> {
        self.inner.begin_rollover(kickoff).await
    }

    async fn save_local_area_batch(&self, batch: LocalAreaBatch) -> AppResult<()> {
        let fail = match self.failures.lock().unwrap().get_mut(&batch.local_area_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if fail {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.save_local_area_batch(batch).await
    }

    async fn complete_rollover(
        &self,
        district_id: i32,
        target_fiscal_year: i32,
    ) -> AppResult<DistrictRolloverStatus> {
        self.inner.complete_rollover(district_id, target_fiscal_year).await
    }

    async fn record_rollover_failure(&self, district_id: i32, message: String) -> AppResult<()> {
        self.inner.record_rollover_failure(district_id, message).await
    }

    async fn dismiss_rollover_message(
        &self,
        district_id: i32,
    ) -> AppResult<Option<DistrictRolloverStatus>> {
        self.inner.dismiss_rollover_message(district_id).await
    }
}

/// Poll a rollover job until it leaves the Running state
pub async fn wait_for_job(services: &Services, started: &RolloverStarted) -> JobProgress {
    let handle = JobHandle {
        job_id: started.job_id,
        district_id: started.district_id,
    };
    for _ in 0..500 {
        if let Some(progress) = services.rollover.job_progress(&handle) {
            if progress.state != JobState::Running {
                return progress;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("rollover job {} did not finish", started.job_id);
}
