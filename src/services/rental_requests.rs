//! Rental request service: queue creation, offer responses, updates and
//! cancellation

use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        CreateRentalRequest, HistoryRecord, OfferResponse, RecordOfferResponse, RentalAgreement,
        RentalRequest, RentalRequestDetails, RentalRequestStatus, RotationListEntry,
        UpdateRentalRequest,
    },
    repository::{
        NewRentalAgreement, NewRentalRequest, OfferCommit, PointerAdvance, RentalRequestUpdate,
        Repository,
    },
};

use super::{fiscal, request_status, rotation};

#[derive(Clone)]
pub struct RentalRequestService {
    repository: Repository,
}

impl RentalRequestService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    async fn load_request(&self, id: i32) -> AppResult<RentalRequest> {
        self.repository
            .get_rental_request(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Rental request {} not found", id)))
    }

    /// Request with its queue in offer order
    pub async fn get(&self, id: i32) -> AppResult<RentalRequestDetails> {
        let request = self.load_request(id).await?;
        let rotation_list = self.repository.list_rotation_entries(id).await?;
        Ok(RentalRequestDetails {
            hired_count: request_status::hired_count(&rotation_list),
            request,
            rotation_list,
        })
    }

    pub async fn history(&self, id: i32) -> AppResult<Vec<HistoryRecord>> {
        self.load_request(id).await?;
        self.repository.list_request_history(id).await
    }

    pub async fn agreements(&self, id: i32) -> AppResult<Vec<RentalAgreement>> {
        self.load_request(id).await?;
        self.repository.list_request_agreements(id).await
    }

    /// Create a request and generate its full offer queue from the pointer
    pub async fn create(&self, input: CreateRentalRequest) -> AppResult<RentalRequestDetails> {
        input.validate()?;

        self.repository
            .get_local_area(input.local_area_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Local area {} not found", input.local_area_id))
            })?;
        self.repository
            .get_district_equipment_type(input.district_equipment_type_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "District equipment type {} not found",
                    input.district_equipment_type_id
                ))
            })?;

        let existing = self
            .repository
            .find_in_progress_request(input.local_area_id, input.district_equipment_type_id)
            .await?;
        let status = request_status::admit_new_request(existing)?;

        let equipment = self
            .repository
            .list_equipment(input.local_area_id, input.district_equipment_type_id)
            .await?;
        let pointer = self
            .repository
            .get_rotation_pointer(input.local_area_id, input.district_equipment_type_id)
            .await?;
        let entries = rotation::build_queue(&equipment, pointer.as_ref());

        let created = self
            .repository
            .create_rental_request(
                NewRentalRequest {
                    project_id: input.project_id,
                    local_area_id: input.local_area_id,
                    district_equipment_type_id: input.district_equipment_type_id,
                    equipment_count: input.equipment_count,
                    status,
                    expected_hours: input.expected_hours,
                    expected_start_date: input.expected_start_date,
                    expected_end_date: input.expected_end_date,
                    first_on_rotation_list: entries.first().map(|e| e.equipment_id),
                    history: format!(
                        "Rental request created for {} equipment with {} on the rotation list",
                        input.equipment_count,
                        entries.len()
                    ),
                },
                entries,
            )
            .await?;

        tracing::info!(
            request_id = created.id,
            local_area_id = created.local_area_id,
            district_equipment_type_id = created.district_equipment_type_id,
            "Rental request created"
        );

        self.get(created.id).await
    }

    /// Change the requested count and expectations of an In Progress request
    pub async fn update(
        &self,
        id: i32,
        input: UpdateRentalRequest,
    ) -> AppResult<RentalRequestDetails> {
        input.validate()?;

        let request = self.load_request(id).await?;
        let entries = self.repository.list_rotation_entries(id).await?;
        let hired = request_status::hired_count(&entries);
        let status = request_status::ensure_count_update(&request, input.equipment_count, hired)?;

        let completed = status == RentalRequestStatus::Complete;
        self.repository
            .update_rental_request(RentalRequestUpdate {
                id,
                expected_version: input.version,
                equipment_count: input.equipment_count,
                expected_hours: input.expected_hours,
                expected_start_date: input.expected_start_date,
                expected_end_date: input.expected_end_date,
                status,
                first_on_rotation_list: if completed {
                    None
                } else {
                    request.first_on_rotation_list
                },
                history: completed.then(|| {
                    format!("Status changed from {} to {}", request.status, status)
                }),
            })
            .await?;

        if completed {
            tracing::info!(request_id = id, "Rental request completed by count update");
        }

        self.get(id).await
    }

    /// Record an owner's response to one entry of the queue.
    ///
    /// Writes the response, the agreement for a hire, the new request status
    /// and the advanced rotation pointer in one atomic commit.
    pub async fn record_offer_response(
        &self,
        request_id: i32,
        input: RecordOfferResponse,
    ) -> AppResult<RentalRequestDetails> {
        input.validate()?;
        if input.offer_response.is_none() && !input.is_force_hire {
            return Err(AppError::Validation(
                "offer_response is required unless is_force_hire is set".to_string(),
            ));
        }

        let request = self.load_request(request_id).await?;
        let entries = self.repository.list_rotation_entries(request_id).await?;
        let entry = find_entry(&entries, input.rotation_list_entry_id, request_id)?;

        request_status::ensure_can_record_offer(&request, entry)?;
        if entry.version != input.version {
            return Err(AppError::version_conflict("Rotation list entry", entry.id));
        }

        let is_hire = input.is_force_hire || input.offer_response == Some(OfferResponse::Yes);
        let hired = request_status::hired_count(&entries) + i32::from(is_hire);
        let status = request_status::status_for_hires(request.equipment_count, hired);
        let now = Utc::now();

        let agreement = if is_hire {
            Some(NewRentalAgreement {
                equipment_id: entry.equipment_id,
                project_id: request.project_id,
                local_area_id: request.local_area_id,
                fiscal_year: self.agreement_fiscal_year(request.local_area_id).await?,
                estimate_hours: request.expected_hours,
                estimate_start_work: request.expected_start_date,
                dated_on: now,
            })
        } else {
            None
        };

        let equipment = self
            .repository
            .list_equipment(request.local_area_id, request.district_equipment_type_id)
            .await?;
        let pointer = match rotation::next_after(&equipment, entry.equipment_id) {
            Some(next) => {
                let current = self
                    .repository
                    .get_rotation_pointer(request.local_area_id, request.district_equipment_type_id)
                    .await?;
                Some(PointerAdvance {
                    local_area_id: request.local_area_id,
                    district_equipment_type_id: request.district_equipment_type_id,
                    expected_version: current.map(|p| p.version),
                    current_block: next.current_block,
                    next_equipment_id: Some(next.next_equipment_id),
                    last_asked_equipment_id: entry.equipment_id,
                })
            }
            None => None,
        };

        let code = equipment
            .iter()
            .find(|e| e.id == entry.equipment_id)
            .map(|e| e.equipment_code.clone())
            .unwrap_or_else(|| format!("#{}", entry.equipment_id));
        let response = match (input.is_force_hire, input.offer_response) {
            (true, _) => "Force Hire",
            (false, Some(OfferResponse::Yes)) => "Yes",
            (false, _) => "No",
        };
        let mut history = vec![format!("Equipment {} responded: {}", code, response)];
        if status != request.status {
            history.push(format!("Status changed from {} to {}", request.status, status));
        }

        let created = self
            .repository
            .record_offer(OfferCommit {
                request_id,
                request_version: request.version,
                entry_id: entry.id,
                entry_version: entry.version,
                offer_response: input.offer_response,
                is_force_hire: input.is_force_hire,
                asked_date_time: input.asked_date_time.unwrap_or(now),
                offer_response_datetime: now,
                offer_refusal_reason: input.offer_refusal_reason,
                offer_response_note: input.offer_response_note,
                note: input.note,
                agreement,
                request_status: status,
                first_on_rotation_list: if status == RentalRequestStatus::Complete {
                    None
                } else {
                    request.first_on_rotation_list
                },
                pointer,
                history,
            })
            .await?;

        tracing::info!(
            request_id,
            entry_id = entry.id,
            equipment_id = entry.equipment_id,
            response,
            hired,
            status = %status,
            "Offer response recorded"
        );
        if let Some(agreement) = created {
            tracing::info!(request_id, number = %agreement.number, "Rental agreement created");
        }

        self.get(request_id).await
    }

    /// Cancel an In Progress request that has produced no agreements
    pub async fn cancel(&self, id: i32) -> AppResult<()> {
        let request = self.load_request(id).await?;
        let agreements = self.repository.count_request_agreements(id).await?;
        request_status::ensure_can_cancel(&request, agreements)?;

        self.repository.delete_rental_request(id, request.version).await?;

        tracing::info!(request_id = id, "Rental request cancelled");
        Ok(())
    }

    /// Fiscal year stamped on agreements: the district's current one, or the
    /// calendar's when the district has no rollover status yet
    async fn agreement_fiscal_year(&self, local_area_id: i32) -> AppResult<i32> {
        let local_area = self
            .repository
            .get_local_area(local_area_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Local area {} not found", local_area_id)))?;

        let status = self
            .repository
            .get_rollover_status(local_area.district_id)
            .await?;
        Ok(match status {
            Some(status) => status.current_fiscal_year,
            None => fiscal::fiscal_start_year(Utc::now().date_naive()),
        })
    }
}

fn find_entry(
    entries: &[RotationListEntry],
    entry_id: i32,
    request_id: i32,
) -> AppResult<&RotationListEntry> {
    entries.iter().find(|e| e.id == entry_id).ok_or_else(|| {
        AppError::NotFound(format!(
            "Rotation list entry {} not found on rental request {}",
            entry_id, request_id
        ))
    })
}
