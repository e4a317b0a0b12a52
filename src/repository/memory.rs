//! In-memory store
//!
//! Keeps every entity in id-keyed maps behind one lock. Each trait method
//! checks all of its preconditions before touching the arena, so a rejected
//! write leaves nothing behind, the same as a rolled back transaction.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;

use super::{
    rental_requests::agreement_number, LocalAreaBatch, NewRentalRequest, NewRotationEntry,
    OfferCommit, PointerAdvance, RentalRequestUpdate, RolloverKickoff, RotationStore,
};
use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{
        District, DistrictEquipmentType, DistrictRolloverStatus, Equipment, EquipmentStatus,
        HistoryRecord, LocalArea, LocalAreaRotationList, RentalAgreement, RentalAgreementStatus,
        RentalRequest, RentalRequestAttachment, RentalRequestNote, RentalRequestStatus,
        RolloverProgress, RotationListEntry,
    },
};

#[derive(Default)]
struct Arena {
    next_id: i32,
    districts: BTreeMap<i32, District>,
    local_areas: BTreeMap<i32, LocalArea>,
    equipment_types: BTreeMap<i32, DistrictEquipmentType>,
    equipment: BTreeMap<i32, Equipment>,
    pointers: BTreeMap<(i32, i32), LocalAreaRotationList>,
    requests: BTreeMap<i32, RentalRequest>,
    entries: BTreeMap<i32, RotationListEntry>,
    agreements: BTreeMap<i32, RentalAgreement>,
    history: BTreeMap<i32, HistoryRecord>,
    notes: BTreeMap<i32, RentalRequestNote>,
    attachments: BTreeMap<i32, RentalRequestAttachment>,
    statuses: BTreeMap<i32, DistrictRolloverStatus>,
    progress: BTreeMap<i32, RolloverProgress>,
}

impl Arena {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn push_history(&mut self, rental_request_id: i32, text: &str) {
        let id = self.next_id();
        self.history.insert(
            id,
            HistoryRecord {
                id,
                rental_request_id,
                history_text: text.to_string(),
                created_date: Utc::now(),
            },
        );
    }

    fn other_in_progress(&self, local_area_id: i32, det_id: i32, except: Option<i32>) -> bool {
        self.requests.values().any(|r| {
            r.local_area_id == local_area_id
                && r.district_equipment_type_id == det_id
                && r.status == RentalRequestStatus::InProgress
                && Some(r.id) != except
        })
    }

    fn check_pointer(&self, pointer: &PointerAdvance) -> AppResult<()> {
        let key = (pointer.local_area_id, pointer.district_equipment_type_id);
        let current = self.pointers.get(&key).map(|p| p.version);
        if current != pointer.expected_version {
            return Err(AppError::conflict(
                ErrorCode::VersionConflict,
                format!(
                    "Rotation list for local area {} was advanced concurrently, retry",
                    pointer.local_area_id
                ),
            ));
        }
        Ok(())
    }

    fn apply_pointer(&mut self, pointer: &PointerAdvance) {
        let key = (pointer.local_area_id, pointer.district_equipment_type_id);
        match self.pointers.get_mut(&key) {
            Some(existing) => {
                existing.current_block = pointer.current_block;
                existing.next_equipment_id = pointer.next_equipment_id;
                existing.last_asked_equipment_id = Some(pointer.last_asked_equipment_id);
                existing.version += 1;
            }
            None => {
                let id = self.next_id();
                self.pointers.insert(
                    key,
                    LocalAreaRotationList {
                        id,
                        local_area_id: pointer.local_area_id,
                        district_equipment_type_id: pointer.district_equipment_type_id,
                        current_block: pointer.current_block,
                        next_equipment_id: pointer.next_equipment_id,
                        last_asked_equipment_id: Some(pointer.last_asked_equipment_id),
                        version: 1,
                    },
                );
            }
        }
    }
}

/// Store holding everything in process memory
#[derive(Default)]
pub struct MemoryRepository {
    arena: RwLock<Arena>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- Seeding ----

    pub fn insert_district(&self, district: District) {
        self.write().districts.insert(district.id, district);
    }

    pub fn insert_local_area(&self, local_area: LocalArea) {
        self.write().local_areas.insert(local_area.id, local_area);
    }

    pub fn insert_equipment_type(&self, equipment_type: DistrictEquipmentType) {
        self.write()
            .equipment_types
            .insert(equipment_type.id, equipment_type);
    }

    pub fn insert_equipment(&self, equipment: Equipment) {
        self.write().equipment.insert(equipment.id, equipment);
    }

    pub fn insert_rollover_status(&self, status: DistrictRolloverStatus) {
        self.write().statuses.insert(status.district_id, status);
    }

    pub fn add_note(&self, rental_request_id: i32, text: &str) -> i32 {
        let mut arena = self.write();
        let id = arena.next_id();
        arena.notes.insert(
            id,
            RentalRequestNote {
                id,
                rental_request_id,
                text: text.to_string(),
                is_no_longer_relevant: false,
            },
        );
        id
    }

    pub fn add_attachment(&self, rental_request_id: i32, file_name: &str) -> i32 {
        let mut arena = self.write();
        let id = arena.next_id();
        arena.attachments.insert(
            id,
            RentalRequestAttachment {
                id,
                rental_request_id,
                file_name: file_name.to_string(),
            },
        );
        id
    }

    /// Administrative status change; bumps the equipment version
    pub fn set_equipment_status(&self, equipment_id: i32, status: EquipmentStatus) -> AppResult<()> {
        let mut arena = self.write();
        let equipment = arena
            .equipment
            .get_mut(&equipment_id)
            .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", equipment_id)))?;
        equipment.status = status;
        equipment.version += 1;
        Ok(())
    }

    // ---- Inspection ----

    pub fn equipment(&self, equipment_id: i32) -> Option<Equipment> {
        self.read().equipment.get(&equipment_id).cloned()
    }

    pub fn agreements(&self) -> Vec<RentalAgreement> {
        self.read().agreements.values().cloned().collect()
    }

    pub fn notes_for(&self, rental_request_id: i32) -> Vec<RentalRequestNote> {
        self.read()
            .notes
            .values()
            .filter(|n| n.rental_request_id == rental_request_id)
            .cloned()
            .collect()
    }

    pub fn attachments_for(&self, rental_request_id: i32) -> Vec<RentalRequestAttachment> {
        self.read()
            .attachments
            .values()
            .filter(|a| a.rental_request_id == rental_request_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RotationStore for MemoryRepository {
    async fn get_district(&self, id: i32) -> AppResult<Option<District>> {
        Ok(self.read().districts.get(&id).cloned())
    }

    async fn get_local_area(&self, id: i32) -> AppResult<Option<LocalArea>> {
        Ok(self.read().local_areas.get(&id).cloned())
    }

    async fn list_local_areas(&self, district_id: i32) -> AppResult<Vec<LocalArea>> {
        Ok(self
            .read()
            .local_areas
            .values()
            .filter(|la| la.district_id == district_id)
            .cloned()
            .collect())
    }

    async fn get_district_equipment_type(
        &self,
        id: i32,
    ) -> AppResult<Option<DistrictEquipmentType>> {
        Ok(self.read().equipment_types.get(&id).cloned())
    }

    async fn list_equipment(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Vec<Equipment>> {
        Ok(self
            .read()
            .equipment
            .values()
            .filter(|e| {
                e.local_area_id == local_area_id
                    && e.district_equipment_type_id == district_equipment_type_id
            })
            .cloned()
            .collect())
    }

    async fn list_local_area_equipment(&self, local_area_id: i32) -> AppResult<Vec<Equipment>> {
        let mut equipment: Vec<Equipment> = self
            .read()
            .equipment
            .values()
            .filter(|e| e.local_area_id == local_area_id)
            .cloned()
            .collect();
        equipment.sort_by_key(|e| (e.district_equipment_type_id, e.id));
        Ok(equipment)
    }

    async fn get_rotation_pointer(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<LocalAreaRotationList>> {
        Ok(self
            .read()
            .pointers
            .get(&(local_area_id, district_equipment_type_id))
            .cloned())
    }

    async fn get_rental_request(&self, id: i32) -> AppResult<Option<RentalRequest>> {
        Ok(self.read().requests.get(&id).cloned())
    }

    async fn list_rotation_entries(
        &self,
        rental_request_id: i32,
    ) -> AppResult<Vec<RotationListEntry>> {
        let mut entries: Vec<RotationListEntry> = self
            .read()
            .entries
            .values()
            .filter(|e| e.rental_request_id == rental_request_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.rotation_list_sort_order);
        Ok(entries)
    }

    async fn find_in_progress_request(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<i32>> {
        Ok(self
            .read()
            .requests
            .values()
            .find(|r| {
                r.local_area_id == local_area_id
                    && r.district_equipment_type_id == district_equipment_type_id
                    && r.status == RentalRequestStatus::InProgress
            })
            .map(|r| r.id))
    }

    async fn count_request_agreements(&self, rental_request_id: i32) -> AppResult<i64> {
        Ok(self
            .read()
            .agreements
            .values()
            .filter(|a| a.rental_request_id == rental_request_id)
            .count() as i64)
    }

    async fn list_request_history(&self, rental_request_id: i32) -> AppResult<Vec<HistoryRecord>> {
        Ok(self
            .read()
            .history
            .values()
            .filter(|h| h.rental_request_id == rental_request_id)
            .cloned()
            .collect())
    }

    async fn list_request_agreements(
        &self,
        rental_request_id: i32,
    ) -> AppResult<Vec<RentalAgreement>> {
        Ok(self
            .read()
            .agreements
            .values()
            .filter(|a| a.rental_request_id == rental_request_id)
            .cloned()
            .collect())
    }

    async fn create_rental_request(
        &self,
        request: NewRentalRequest,
        entries: Vec<NewRotationEntry>,
    ) -> AppResult<RentalRequest> {
        let mut arena = self.write();

        if request.status == RentalRequestStatus::InProgress
            && arena.other_in_progress(request.local_area_id, request.district_equipment_type_id, None)
        {
            return Err(AppError::conflict(
                ErrorCode::DuplicateActiveRequest,
                "An In Progress rental request already exists for this local area and equipment type",
            ));
        }

        let id = arena.next_id();
        let created = RentalRequest {
            id,
            project_id: request.project_id,
            local_area_id: request.local_area_id,
            district_equipment_type_id: request.district_equipment_type_id,
            equipment_count: request.equipment_count,
            status: request.status,
            expected_hours: request.expected_hours,
            expected_start_date: request.expected_start_date,
            expected_end_date: request.expected_end_date,
            first_on_rotation_list: request.first_on_rotation_list,
            created_at: Utc::now(),
            version: 1,
        };
        arena.requests.insert(id, created.clone());

        for entry in entries {
            let entry_id = arena.next_id();
            arena.entries.insert(
                entry_id,
                RotationListEntry {
                    id: entry_id,
                    rental_request_id: id,
                    equipment_id: entry.equipment_id,
                    block_number: entry.block_number,
                    rotation_list_sort_order: entry.rotation_list_sort_order,
                    asked_date_time: None,
                    was_asked: false,
                    offer_response: None,
                    offer_response_datetime: None,
                    offer_refusal_reason: None,
                    offer_response_note: None,
                    is_force_hire: false,
                    note: None,
                    rental_agreement_id: None,
                    version: 1,
                },
            );
        }

        arena.push_history(id, &request.history);
        Ok(created)
    }

    async fn update_rental_request(&self, update: RentalRequestUpdate) -> AppResult<RentalRequest> {
        let mut arena = self.write();

        let current = arena
            .requests
            .get(&update.id)
            .ok_or_else(|| AppError::NotFound(format!("Rental request {} not found", update.id)))?;
        if current.version != update.expected_version {
            return Err(AppError::version_conflict("Rental request", update.id));
        }
        if update.status == RentalRequestStatus::InProgress
            && arena.other_in_progress(
                current.local_area_id,
                current.district_equipment_type_id,
                Some(update.id),
            )
        {
            return Err(AppError::conflict(
                ErrorCode::DuplicateActiveRequest,
                "An In Progress rental request already exists for this local area and equipment type",
            ));
        }

        let mut updated = current.clone();
        updated.equipment_count = update.equipment_count;
        updated.expected_hours = update.expected_hours;
        updated.expected_start_date = update.expected_start_date;
        updated.expected_end_date = update.expected_end_date;
        updated.status = update.status;
        updated.first_on_rotation_list = update.first_on_rotation_list;
        updated.version += 1;
        arena.requests.insert(update.id, updated.clone());

        if let Some(ref text) = update.history {
            arena.push_history(update.id, text);
        }
        Ok(updated)
    }

    async fn record_offer(&self, commit: OfferCommit) -> AppResult<Option<RentalAgreement>> {
        let mut arena = self.write();

        match arena.entries.get(&commit.entry_id) {
            Some(entry)
                if entry.rental_request_id == commit.request_id
                    && entry.version == commit.entry_version => {}
            _ => return Err(AppError::version_conflict("Rotation list entry", commit.entry_id)),
        }
        match arena.requests.get(&commit.request_id) {
            Some(request) if request.version == commit.request_version => {}
            _ => return Err(AppError::version_conflict("Rental request", commit.request_id)),
        }
        if let Some(ref pointer) = commit.pointer {
            arena.check_pointer(pointer)?;
        }

        let agreement = match commit.agreement {
            Some(ref new_agreement) => {
                let existing = arena
                    .agreements
                    .values()
                    .filter(|a| {
                        a.local_area_id == new_agreement.local_area_id
                            && a.fiscal_year == new_agreement.fiscal_year
                    })
                    .count() as i64;
                let id = arena.next_id();
                let agreement = RentalAgreement {
                    id,
                    number: agreement_number(
                        new_agreement.fiscal_year,
                        new_agreement.local_area_id,
                        existing + 1,
                    ),
                    equipment_id: new_agreement.equipment_id,
                    project_id: new_agreement.project_id,
                    rental_request_id: commit.request_id,
                    rotation_list_entry_id: commit.entry_id,
                    local_area_id: new_agreement.local_area_id,
                    fiscal_year: new_agreement.fiscal_year,
                    status: RentalAgreementStatus::Active,
                    dated_on: new_agreement.dated_on,
                    estimate_hours: new_agreement.estimate_hours,
                    estimate_start_work: new_agreement.estimate_start_work,
                };
                arena.agreements.insert(id, agreement.clone());
                Some(agreement)
            }
            None => None,
        };

        if let Some(entry) = arena.entries.get_mut(&commit.entry_id) {
            entry.asked_date_time = Some(commit.asked_date_time);
            entry.was_asked = true;
            entry.offer_response = commit.offer_response;
            entry.offer_response_datetime = Some(commit.offer_response_datetime);
            entry.offer_refusal_reason = commit.offer_refusal_reason.clone();
            entry.offer_response_note = commit.offer_response_note.clone();
            entry.is_force_hire = commit.is_force_hire;
            entry.note = commit.note.clone();
            entry.rental_agreement_id = agreement.as_ref().map(|a| a.id);
            entry.version += 1;
        }

        if let Some(request) = arena.requests.get_mut(&commit.request_id) {
            request.status = commit.request_status;
            request.first_on_rotation_list = commit.first_on_rotation_list;
            request.version += 1;
        }

        if let Some(ref pointer) = commit.pointer {
            arena.apply_pointer(pointer);
        }

        for text in &commit.history {
            arena.push_history(commit.request_id, text);
        }

        Ok(agreement)
    }

    async fn delete_rental_request(&self, id: i32, expected_version: i32) -> AppResult<()> {
        let mut arena = self.write();

        if arena.agreements.values().any(|a| a.rental_request_id == id) {
            return Err(AppError::invariant(
                ErrorCode::AgreementsExist,
                format!("Rental request {} has rental agreements and cannot be cancelled", id),
            ));
        }
        match arena.requests.get(&id) {
            Some(request) if request.version == expected_version => {}
            _ => return Err(AppError::version_conflict("Rental request", id)),
        }

        arena.requests.remove(&id);
        arena.entries.retain(|_, e| e.rental_request_id != id);
        arena.history.retain(|_, h| h.rental_request_id != id);
        arena.notes.retain(|_, n| n.rental_request_id != id);
        arena.attachments.retain(|_, a| a.rental_request_id != id);
        Ok(())
    }

    async fn get_rollover_status(
        &self,
        district_id: i32,
    ) -> AppResult<Option<DistrictRolloverStatus>> {
        Ok(self.read().statuses.get(&district_id).cloned())
    }

    async fn get_rollover_progress(&self, district_id: i32) -> AppResult<Option<RolloverProgress>> {
        Ok(self.read().progress.get(&district_id).cloned())
    }

    async fn list_unfinished_rollovers(&self) -> AppResult<Vec<RolloverProgress>> {
        Ok(self
            .read()
            .progress
            .values()
            .filter(|p| p.is_unfinished())
            .cloned()
            .collect())
    }

    async fn begin_rollover(&self, kickoff: RolloverKickoff) -> AppResult<()> {
        let mut arena = self.write();

        if kickoff.resume {
            if let Some(progress) = arena.progress.get_mut(&kickoff.district_id) {
                progress.job_id = Some(kickoff.job_id);
                progress.last_error = None;
                progress.updated_at = kickoff.started_at;
            }
            if let Some(status) = arena.statuses.get_mut(&kickoff.district_id) {
                status.progress_percentage = Some(status.progress_percentage.unwrap_or(1).max(1));
                status.display_rollover_message = false;
                status.rollover_end_date = None;
            }
        } else {
            arena.progress.insert(
                kickoff.district_id,
                RolloverProgress {
                    district_id: kickoff.district_id,
                    target_fiscal_year: Some(kickoff.target_fiscal_year),
                    progress_percentage: Some(1),
                    last_processed_local_area_id: None,
                    scoring_rules: Json(kickoff.scoring_rules),
                    job_id: Some(kickoff.job_id),
                    last_error: None,
                    updated_at: kickoff.started_at,
                },
            );
            if let Some(status) = arena.statuses.get_mut(&kickoff.district_id) {
                status.progress_percentage = Some(1);
                status.display_rollover_message = false;
                status.rollover_start_date = Some(kickoff.started_at);
                status.rollover_end_date = None;
            }
        }
        Ok(())
    }

    async fn save_local_area_batch(&self, batch: LocalAreaBatch) -> AppResult<()> {
        let mut arena = self.write();

        for assignment in &batch.assignments {
            match arena.equipment.get(&assignment.equipment_id) {
                Some(e) if e.version == assignment.expected_version => {}
                _ => return Err(AppError::version_conflict("Equipment", assignment.equipment_id)),
            }
        }

        for assignment in &batch.assignments {
            if let Some(equipment) = arena.equipment.get_mut(&assignment.equipment_id) {
                equipment.seniority = Some(assignment.seniority);
                equipment.block_number = Some(assignment.block_number);
                equipment.block_position = Some(assignment.block_position);
                equipment.number_of_blocks = Some(assignment.number_of_blocks);
                equipment.seniority_fiscal_year = Some(batch.fiscal_year);
                equipment.version += 1;
            }
        }

        if let Some(progress) = arena.progress.get_mut(&batch.district_id) {
            progress.last_processed_local_area_id = Some(batch.local_area_id);
            progress.progress_percentage = Some(batch.progress_percentage);
            progress.updated_at = Utc::now();
        }
        if let Some(status) = arena.statuses.get_mut(&batch.district_id) {
            status.progress_percentage = Some(batch.progress_percentage);
        }
        Ok(())
    }

    async fn complete_rollover(
        &self,
        district_id: i32,
        target_fiscal_year: i32,
    ) -> AppResult<DistrictRolloverStatus> {
        let mut arena = self.write();
        let now = Utc::now();

        let status = arena.statuses.get_mut(&district_id).ok_or_else(|| {
            AppError::NotFound(format!("Rollover status for district {} not found", district_id))
        })?;
        status.current_fiscal_year = target_fiscal_year;
        status.next_fiscal_year = target_fiscal_year + 1;
        status.progress_percentage = Some(100);
        status.display_rollover_message = true;
        status.rollover_end_date = Some(now);
        let status = status.clone();

        if let Some(progress) = arena.progress.get_mut(&district_id) {
            progress.target_fiscal_year = None;
            progress.progress_percentage = Some(100);
            progress.last_processed_local_area_id = None;
            progress.job_id = None;
            progress.last_error = None;
            progress.updated_at = now;
        }
        Ok(status)
    }

    async fn record_rollover_failure(&self, district_id: i32, message: String) -> AppResult<()> {
        if let Some(progress) = self.write().progress.get_mut(&district_id) {
            progress.last_error = Some(message);
            progress.job_id = None;
            progress.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn dismiss_rollover_message(
        &self,
        district_id: i32,
    ) -> AppResult<Option<DistrictRolloverStatus>> {
        let mut arena = self.write();

        let dismissed = match arena.statuses.get_mut(&district_id) {
            Some(status)
                if status.display_rollover_message && status.progress_percentage == Some(100) =>
            {
                status.display_rollover_message = false;
                status.progress_percentage = None;
                true
            }
            _ => false,
        };
        if dismissed {
            if let Some(progress) = arena.progress.get_mut(&district_id) {
                progress.progress_percentage = None;
            }
        }
        Ok(arena.statuses.get(&district_id).cloned())
    }
}
