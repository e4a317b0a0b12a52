//! Rental request state machine
//!
//! `New -> InProgress -> {Complete, Cancelled}`. Complete is reached only by
//! the hire count and is terminal; Cancelled only from InProgress with no
//! agreements.

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{RentalRequest, RentalRequestStatus, RotationListEntry},
};

/// Yes and force-hire responses recorded on a queue
pub fn hired_count(entries: &[RotationListEntry]) -> i32 {
    entries.iter().filter(|e| e.is_hire()).count() as i32
}

/// Resolve a `New` request against the pair's existing In Progress request
pub fn admit_new_request(existing_in_progress: Option<i32>) -> AppResult<RentalRequestStatus> {
    match existing_in_progress {
        Some(existing) => Err(AppError::conflict(
            ErrorCode::DuplicateActiveRequest,
            format!(
                "Rental request {} is already In Progress for this local area and equipment type",
                existing
            ),
        )),
        None => Ok(RentalRequestStatus::InProgress),
    }
}

/// Status implied by the hire count
pub fn status_for_hires(equipment_count: i32, hired: i32) -> RentalRequestStatus {
    if hired >= equipment_count {
        RentalRequestStatus::Complete
    } else {
        RentalRequestStatus::InProgress
    }
}

fn ensure_in_progress(request: &RentalRequest) -> AppResult<()> {
    if request.status != RentalRequestStatus::InProgress {
        return Err(AppError::invariant(
            ErrorCode::RequestNotInProgress,
            format!("Rental request {} is {}, not In Progress", request.id, request.status),
        ));
    }
    Ok(())
}

/// Offers are only recorded on an In Progress request, once per entry
pub fn ensure_can_record_offer(request: &RentalRequest, entry: &RotationListEntry) -> AppResult<()> {
    ensure_in_progress(request)?;
    if entry.is_answered() {
        return Err(AppError::invariant(
            ErrorCode::EntryAlreadyAnswered,
            format!("Rotation list entry {} already has a response", entry.id),
        ));
    }
    Ok(())
}

/// Validate a new equipment count; returns the status it implies
pub fn ensure_count_update(
    request: &RentalRequest,
    equipment_count: i32,
    hired: i32,
) -> AppResult<RentalRequestStatus> {
    ensure_in_progress(request)?;
    if equipment_count < hired {
        return Err(AppError::invariant(
            ErrorCode::CountBelowHired,
            format!(
                "Equipment count {} is below the {} already hired",
                equipment_count, hired
            ),
        ));
    }
    Ok(status_for_hires(equipment_count, hired))
}

/// Cancellation guard: agreements block it first, then a Complete status
pub fn ensure_can_cancel(request: &RentalRequest, agreement_count: i64) -> AppResult<()> {
    if agreement_count > 0 {
        return Err(AppError::invariant(
            ErrorCode::AgreementsExist,
            format!(
                "Rental request {} has {} rental agreement(s) and cannot be cancelled",
                request.id, agreement_count
            ),
        ));
    }
    if request.status == RentalRequestStatus::Complete {
        return Err(AppError::invariant(
            ErrorCode::RequestComplete,
            format!("Rental request {} is Complete and cannot be cancelled", request.id),
        ));
    }
    ensure_in_progress(request)
}
