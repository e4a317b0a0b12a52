//! Rental request lifecycle against the in-memory store

use hets_server::{
    error::{AppError, ErrorCode},
    models::{
        CreateRentalRequest, EquipmentStatus, OfferResponse, RecordOfferResponse,
        RentalRequestDetails, RentalRequestStatus, UpdateRentalRequest,
    },
    repository::RotationStore,
    services::Services,
};

use crate::common::*;

fn create_input(equipment_count: i32) -> CreateRentalRequest {
    CreateRentalRequest {
        local_area_id: LOCAL_AREA,
        district_equipment_type_id: EXCAVATOR,
        equipment_count,
        project_id: Some(77),
        expected_hours: Some(120.0),
        expected_start_date: None,
        expected_end_date: None,
    }
}

fn queue(details: &RentalRequestDetails) -> Vec<i32> {
    details.rotation_list.iter().map(|e| e.equipment_id).collect()
}

/// Answer the entry holding `equipment_id`
async fn respond(
    services: &Services,
    details: &RentalRequestDetails,
    equipment_id: i32,
    response: Option<OfferResponse>,
    force_hire: bool,
) -> Result<RentalRequestDetails, AppError> {
    let entry = details
        .rotation_list
        .iter()
        .find(|e| e.equipment_id == equipment_id)
        .unwrap();
    services
        .rental_requests
        .record_offer_response(
            details.request.id,
            RecordOfferResponse {
                rotation_list_entry_id: entry.id,
                offer_response: response,
                is_force_hire: force_hire,
                asked_date_time: None,
                offer_refusal_reason: None,
                offer_response_note: None,
                note: None,
                version: entry.version,
            },
        )
        .await
}

#[tokio::test]
async fn test_queue_follows_block_order() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(2)).await.unwrap();
    assert_eq!(queue(&details), vec![1, 3, 5, 2, 4]);
    assert_eq!(details.request.status, RentalRequestStatus::InProgress);
    assert_eq!(details.request.first_on_rotation_list, Some(1));
    assert_eq!(details.hired_count, 0);
}

#[tokio::test]
async fn test_completes_exactly_on_third_hire() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(3)).await.unwrap();

    let details = respond(&services, &details, 1, Some(OfferResponse::Yes), false).await.unwrap();
    let details = respond(&services, &details, 3, Some(OfferResponse::No), false).await.unwrap();
    let details = respond(&services, &details, 5, Some(OfferResponse::Yes), false).await.unwrap();
    assert_eq!(details.request.status, RentalRequestStatus::InProgress);
    assert_eq!(details.hired_count, 2);

    let details = respond(&services, &details, 2, None, true).await.unwrap();
    assert_eq!(details.request.status, RentalRequestStatus::Complete);
    assert_eq!(details.request.first_on_rotation_list, None);
    assert_eq!(details.hired_count, 3);

    let numbers: Vec<String> = repo.agreements().into_iter().map(|a| a.number).collect();
    assert_eq!(numbers, vec!["2025-10-0001", "2025-10-0002", "2025-10-0003"]);

    let err = respond(&services, &details, 4, Some(OfferResponse::Yes), false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RequestNotInProgress);
}

#[tokio::test]
async fn test_pointer_carries_across_requests() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let first = services.rental_requests.create(create_input(1)).await.unwrap();
    let first = respond(&services, &first, 1, Some(OfferResponse::No), false).await.unwrap();
    let first = respond(&services, &first, 3, Some(OfferResponse::No), false).await.unwrap();

    let pointer = repo
        .get_rotation_pointer(LOCAL_AREA, EXCAVATOR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pointer.next_equipment_id, Some(5));
    assert_eq!(pointer.last_asked_equipment_id, Some(3));
    assert_eq!(pointer.current_block, Some(1));

    services.rental_requests.cancel(first.request.id).await.unwrap();

    let second = services.rental_requests.create(create_input(1)).await.unwrap();
    assert_eq!(queue(&second), vec![5, 2, 4, 1, 3]);
    assert_eq!(second.request.first_on_rotation_list, Some(5));
}

#[tokio::test]
async fn test_pointer_wraps_after_last() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(1)).await.unwrap();
    respond(&services, &details, 4, Some(OfferResponse::No), false).await.unwrap();

    let pointer = repo
        .get_rotation_pointer(LOCAL_AREA, EXCAVATOR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pointer.next_equipment_id, Some(1));
    assert_eq!(pointer.current_block, Some(1));
}

#[tokio::test]
async fn test_duplicate_in_progress_rejected() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    services.rental_requests.create(create_input(1)).await.unwrap();
    let err = services.rental_requests.create(create_input(1)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateActiveRequest);
    assert!(matches!(err, AppError::Conflict { .. }));

    let mut other_type = create_input(1);
    other_type.district_equipment_type_id = DUMP_TRUCK;
    let created = services.rental_requests.create(other_type).await.unwrap();
    assert!(created.rotation_list.is_empty());
}

#[tokio::test]
async fn test_non_approved_equipment_skipped() {
    let repo = rotation_repository();
    repo.set_equipment_status(3, EquipmentStatus::Pending).unwrap();
    repo.set_equipment_status(4, EquipmentStatus::Archived).unwrap();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(1)).await.unwrap();
    assert_eq!(queue(&details), vec![1, 5, 2]);
}

#[tokio::test]
async fn test_cancel_blocked_by_agreement() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(2)).await.unwrap();
    respond(&services, &details, 1, Some(OfferResponse::Yes), false).await.unwrap();

    let err = services.rental_requests.cancel(details.request.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AgreementsExist);
    assert!(services.rental_requests.get(details.request.id).await.is_ok());
}

#[tokio::test]
async fn test_cancel_complete_request_with_agreements_reports_agreements() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(1)).await.unwrap();
    let details = respond(&services, &details, 1, Some(OfferResponse::Yes), false).await.unwrap();
    assert_eq!(details.request.status, RentalRequestStatus::Complete);

    let err = services.rental_requests.cancel(details.request.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AgreementsExist);
}

#[tokio::test]
async fn test_cancel_cascades_children() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(2)).await.unwrap();
    let id = details.request.id;
    respond(&services, &details, 1, Some(OfferResponse::No), false).await.unwrap();
    repo.add_note(id, "Owner asked to call back");
    repo.add_attachment(id, "site-plan.pdf");

    services.rental_requests.cancel(id).await.unwrap();

    let err = services.rental_requests.get(id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(repo.list_rotation_entries(id).await.unwrap().is_empty());
    assert!(repo.list_request_history(id).await.unwrap().is_empty());
    assert!(repo.notes_for(id).is_empty());
    assert!(repo.attachments_for(id).is_empty());
}

#[tokio::test]
async fn test_stale_entry_version_rejected() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(2)).await.unwrap();
    let entry = &details.rotation_list[0];
    let err = services
        .rental_requests
        .record_offer_response(
            details.request.id,
            RecordOfferResponse {
                rotation_list_entry_id: entry.id,
                offer_response: Some(OfferResponse::Yes),
                is_force_hire: false,
                asked_date_time: None,
                offer_refusal_reason: None,
                offer_response_note: None,
                note: None,
                version: entry.version + 1,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::VersionConflict);
    assert!(repo.agreements().is_empty());
}

#[tokio::test]
async fn test_entry_answered_only_once() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(2)).await.unwrap();
    let answered = respond(&services, &details, 1, Some(OfferResponse::No), false).await.unwrap();

    let err = respond(&services, &answered, 1, Some(OfferResponse::Yes), false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::EntryAlreadyAnswered);
}

#[tokio::test]
async fn test_response_required_without_force_hire() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(1)).await.unwrap();
    let err = respond(&services, &details, 1, None, false).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_count_update_rules() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(3)).await.unwrap();
    let details = respond(&services, &details, 1, Some(OfferResponse::Yes), false).await.unwrap();
    let details = respond(&services, &details, 3, Some(OfferResponse::Yes), false).await.unwrap();
    let id = details.request.id;

    let update = |equipment_count: i32, version: i32| UpdateRentalRequest {
        equipment_count,
        expected_hours: Some(80.0),
        expected_start_date: None,
        expected_end_date: None,
        version,
    };

    let err = services
        .rental_requests
        .update(id, update(1, details.request.version))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CountBelowHired);

    let err = services
        .rental_requests
        .update(id, update(2, details.request.version - 1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::VersionConflict);

    let updated = services
        .rental_requests
        .update(id, update(2, details.request.version))
        .await
        .unwrap();
    assert_eq!(updated.request.status, RentalRequestStatus::Complete);
    assert_eq!(updated.request.first_on_rotation_list, None);
    assert_eq!(updated.request.expected_hours, Some(80.0));
}

#[tokio::test]
async fn test_history_records_responses() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let details = services.rental_requests.create(create_input(1)).await.unwrap();
    respond(&services, &details, 1, Some(OfferResponse::Yes), false).await.unwrap();

    let history: Vec<String> = services
        .rental_requests
        .history(details.request.id)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.history_text)
        .collect();
    assert_eq!(history.len(), 3);
    assert_eq!(history[1], "Equipment EQ-0001 responded: Yes");
    assert_eq!(history[2], "Status changed from In Progress to Complete");
}

#[tokio::test]
async fn test_retired_equipment_answer_still_advances_pointer() {
    let repo = rotation_repository();
    let services = services(&repo, 1);

    let first = services.rental_requests.create(create_input(1)).await.unwrap();
    let first = respond(&services, &first, 1, Some(OfferResponse::No), false).await.unwrap();
    repo.set_equipment_status(3, EquipmentStatus::Retired).unwrap();
    let first = respond(&services, &first, 3, Some(OfferResponse::No), false).await.unwrap();

    let pointer = repo
        .get_rotation_pointer(LOCAL_AREA, EXCAVATOR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pointer.next_equipment_id, Some(5));
    assert_eq!(pointer.last_asked_equipment_id, Some(3));

    services.rental_requests.cancel(first.request.id).await.unwrap();

    let second = services.rental_requests.create(create_input(1)).await.unwrap();
    assert_eq!(queue(&second), vec![5, 2, 4, 1]);
}
