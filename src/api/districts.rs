//! District rollover endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{RolloverStarted, RolloverStatusView},
    services::jobs::{JobHandle, JobProgress},
    AppState,
};

/// Start rollover request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartRolloverRequest {
    /// Scoring rules for this run; the configured rules when omitted
    #[schema(value_type = Option<Object>)]
    pub scoring_rules: Option<serde_json::Value>,
}

/// Start the annual rollover for a district
#[utoipa::path(
    post,
    path = "/districts/{id}/rollover",
    tag = "rollover",
    params(
        ("id" = i32, Path, description = "District ID")
    ),
    request_body = StartRolloverRequest,
    responses(
        (status = 202, description = "Rollover job submitted", body = RolloverStarted),
        (status = 404, description = "District not found"),
        (status = 409, description = "Rollover already active or fiscal year already current"),
        (status = 500, description = "Malformed scoring rules")
    )
)]
pub async fn start_rollover(
    State(state): State<AppState>,
    Path(district_id): Path<i32>,
    request: Option<Json<StartRolloverRequest>>,
) -> AppResult<(StatusCode, Json<RolloverStarted>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let started = state
        .services
        .rollover
        .start_rollover(district_id, request.scoring_rules)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}

/// Get rollover status for a district
#[utoipa::path(
    get,
    path = "/districts/{id}/rollover",
    tag = "rollover",
    params(
        ("id" = i32, Path, description = "District ID")
    ),
    responses(
        (status = 200, description = "Rollover status", body = RolloverStatusView),
        (status = 404, description = "District not found")
    )
)]
pub async fn get_rollover_status(
    State(state): State<AppState>,
    Path(district_id): Path<i32>,
) -> AppResult<Json<RolloverStatusView>> {
    let status = state.services.rollover.get_status(district_id).await?;
    Ok(Json(status))
}

/// Dismiss the rollover completion message
#[utoipa::path(
    post,
    path = "/districts/{id}/rollover/dismiss",
    tag = "rollover",
    params(
        ("id" = i32, Path, description = "District ID")
    ),
    responses(
        (status = 200, description = "Status after dismissal", body = RolloverStatusView),
        (status = 404, description = "District not found")
    )
)]
pub async fn dismiss_rollover_message(
    State(state): State<AppState>,
    Path(district_id): Path<i32>,
) -> AppResult<Json<RolloverStatusView>> {
    let status = state
        .services
        .rollover
        .dismiss_rollover_message(district_id)
        .await?;
    Ok(Json(status))
}

/// Cancel the running rollover at its next local area
#[utoipa::path(
    post,
    path = "/districts/{id}/rollover/cancel",
    tag = "rollover",
    params(
        ("id" = i32, Path, description = "District ID")
    ),
    responses(
        (status = 202, description = "Cancellation requested"),
        (status = 404, description = "District not found or no rollover running")
    )
)]
pub async fn cancel_rollover(
    State(state): State<AppState>,
    Path(district_id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.rollover.cancel_rollover(district_id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Poll a rollover job
#[utoipa::path(
    get,
    path = "/districts/{id}/rollover/jobs/{job_id}",
    tag = "rollover",
    params(
        ("id" = i32, Path, description = "District ID"),
        ("job_id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job progress", body = JobProgress),
        (status = 404, description = "Job unknown to this process")
    )
)]
pub async fn get_rollover_job(
    State(state): State<AppState>,
    Path((district_id, job_id)): Path<(i32, Uuid)>,
) -> AppResult<Json<JobProgress>> {
    state
        .services
        .rollover
        .job_progress(&JobHandle {
            job_id,
            district_id,
        })
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Rollover job {} not found", job_id)))
}

/// Current and next fiscal years of a district
#[utoipa::path(
    get,
    path = "/districts/{id}/fiscal-years",
    tag = "rollover",
    params(
        ("id" = i32, Path, description = "District ID")
    ),
    responses(
        (status = 200, description = "Fiscal year labels", body = Vec<String>),
        (status = 404, description = "District not found")
    )
)]
pub async fn get_fiscal_years(
    State(state): State<AppState>,
    Path(district_id): Path<i32>,
) -> AppResult<Json<Vec<String>>> {
    let years = state.services.rollover.get_fiscal_years(district_id).await?;
    Ok(Json(years))
}
