//! Rental request endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        CreateRentalRequest, HistoryRecord, RecordOfferResponse, RentalAgreement,
        RentalRequestDetails, UpdateRentalRequest,
    },
    AppState,
};

/// Create a rental request and its rotation list
#[utoipa::path(
    post,
    path = "/rental-requests",
    tag = "rental_requests",
    request_body = CreateRentalRequest,
    responses(
        (status = 201, description = "Rental request created", body = RentalRequestDetails),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Local area or equipment type not found"),
        (status = 409, description = "An In Progress request already exists for the pair")
    )
)]
pub async fn create_rental_request(
    State(state): State<AppState>,
    Json(request): Json<CreateRentalRequest>,
) -> AppResult<(StatusCode, Json<RentalRequestDetails>)> {
    let created = state.services.rental_requests.create(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get a rental request with its rotation list
#[utoipa::path(
    get,
    path = "/rental-requests/{id}",
    tag = "rental_requests",
    params(
        ("id" = i32, Path, description = "Rental request ID")
    ),
    responses(
        (status = 200, description = "Rental request", body = RentalRequestDetails),
        (status = 404, description = "Rental request not found")
    )
)]
pub async fn get_rental_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<RentalRequestDetails>> {
    let request = state.services.rental_requests.get(id).await?;
    Ok(Json(request))
}

/// Update the equipment count and expectations of a request
#[utoipa::path(
    put,
    path = "/rental-requests/{id}",
    tag = "rental_requests",
    params(
        ("id" = i32, Path, description = "Rental request ID")
    ),
    request_body = UpdateRentalRequest,
    responses(
        (status = 200, description = "Rental request updated", body = RentalRequestDetails),
        (status = 404, description = "Rental request not found"),
        (status = 409, description = "Version conflict"),
        (status = 422, description = "Count below hired or request not In Progress")
    )
)]
pub async fn update_rental_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateRentalRequest>,
) -> AppResult<Json<RentalRequestDetails>> {
    let updated = state.services.rental_requests.update(id, request).await?;
    Ok(Json(updated))
}

/// Record an owner's response on the rotation list
#[utoipa::path(
    put,
    path = "/rental-requests/{id}/rotation-list",
    tag = "rental_requests",
    params(
        ("id" = i32, Path, description = "Rental request ID")
    ),
    request_body = RecordOfferResponse,
    responses(
        (status = 200, description = "Response recorded", body = RentalRequestDetails),
        (status = 400, description = "Invalid response"),
        (status = 404, description = "Rental request or entry not found"),
        (status = 409, description = "Version conflict"),
        (status = 422, description = "Request not In Progress or entry already answered")
    )
)]
pub async fn record_offer_response(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(response): Json<RecordOfferResponse>,
) -> AppResult<Json<RentalRequestDetails>> {
    let updated = state
        .services
        .rental_requests
        .record_offer_response(id, response)
        .await?;
    Ok(Json(updated))
}

/// Cancel a rental request
#[utoipa::path(
    delete,
    path = "/rental-requests/{id}",
    tag = "rental_requests",
    params(
        ("id" = i32, Path, description = "Rental request ID")
    ),
    responses(
        (status = 204, description = "Rental request cancelled"),
        (status = 404, description = "Rental request not found"),
        (status = 409, description = "Version conflict"),
        (status = 422, description = "Agreements exist or request is Complete")
    )
)]
pub async fn cancel_rental_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.rental_requests.cancel(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// History of a rental request
#[utoipa::path(
    get,
    path = "/rental-requests/{id}/history",
    tag = "rental_requests",
    params(
        ("id" = i32, Path, description = "Rental request ID")
    ),
    responses(
        (status = 200, description = "History records", body = Vec<HistoryRecord>),
        (status = 404, description = "Rental request not found")
    )
)]
pub async fn get_rental_request_history(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<HistoryRecord>>> {
    let history = state.services.rental_requests.history(id).await?;
    Ok(Json(history))
}

/// Rental agreements created from a request's rotation list
#[utoipa::path(
    get,
    path = "/rental-requests/{id}/agreements",
    tag = "rental_requests",
    params(
        ("id" = i32, Path, description = "Rental request ID")
    ),
    responses(
        (status = 200, description = "Rental agreements", body = Vec<RentalAgreement>),
        (status = 404, description = "Rental request not found")
    )
)]
pub async fn get_rental_request_agreements(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<RentalAgreement>>> {
    let agreements = state.services.rental_requests.agreements(id).await?;
    Ok(Json(agreements))
}
