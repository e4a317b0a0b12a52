//! Rental request, rotation list and agreement models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::{OfferResponse, RentalAgreementStatus, RentalRequestStatus};

// ---------------------------------------------------------------------------
// RentalRequest
// ---------------------------------------------------------------------------

/// Rental request row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RentalRequest {
    pub id: i32,
    pub project_id: Option<i32>,
    pub local_area_id: i32,
    pub district_equipment_type_id: i32,
    /// Number of pieces of equipment requested
    pub equipment_count: i32,
    pub status: RentalRequestStatus,
    pub expected_hours: Option<f64>,
    pub expected_start_date: Option<NaiveDate>,
    pub expected_end_date: Option<NaiveDate>,
    /// Equipment at the head of the queue when the request was created
    pub first_on_rotation_list: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub version: i32,
}

/// Create rental request payload
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateRentalRequest {
    pub local_area_id: i32,
    pub district_equipment_type_id: i32,
    #[validate(range(min = 1, message = "equipment_count must be at least 1"))]
    pub equipment_count: i32,
    pub project_id: Option<i32>,
    #[validate(range(min = 0.0))]
    pub expected_hours: Option<f64>,
    pub expected_start_date: Option<NaiveDate>,
    pub expected_end_date: Option<NaiveDate>,
}

/// Update rental request payload
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateRentalRequest {
    #[validate(range(min = 1, message = "equipment_count must be at least 1"))]
    pub equipment_count: i32,
    pub expected_hours: Option<f64>,
    pub expected_start_date: Option<NaiveDate>,
    pub expected_end_date: Option<NaiveDate>,
    /// Version the caller read
    pub version: i32,
}

/// Request with its full offer queue
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RentalRequestDetails {
    #[serde(flatten)]
    pub request: RentalRequest,
    /// Yes + force-hire responses recorded so far
    pub hired_count: i32,
    pub rotation_list: Vec<RotationListEntry>,
}

// ---------------------------------------------------------------------------
// RotationListEntry
// ---------------------------------------------------------------------------

/// One candidate in a rental request's offer queue
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RotationListEntry {
    pub id: i32,
    pub rental_request_id: i32,
    pub equipment_id: i32,
    pub block_number: Option<i32>,
    /// Offer order within the request, fixed at creation
    pub rotation_list_sort_order: i32,
    pub asked_date_time: Option<DateTime<Utc>>,
    pub was_asked: bool,
    pub offer_response: Option<OfferResponse>,
    pub offer_response_datetime: Option<DateTime<Utc>>,
    pub offer_refusal_reason: Option<String>,
    pub offer_response_note: Option<String>,
    pub is_force_hire: bool,
    pub note: Option<String>,
    pub rental_agreement_id: Option<i32>,
    pub version: i32,
}

impl RotationListEntry {
    /// An entry is terminal once it has any response or was force hired
    pub fn is_answered(&self) -> bool {
        self.offer_response.is_some() || self.is_force_hire
    }

    /// Yes and force hire both count against the requested equipment
    pub fn is_hire(&self) -> bool {
        self.offer_response == Some(OfferResponse::Yes) || self.is_force_hire
    }
}

/// Owner response recorded against a rotation list entry
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RecordOfferResponse {
    pub rotation_list_entry_id: i32,
    pub offer_response: Option<OfferResponse>,
    #[serde(default)]
    pub is_force_hire: bool,
    pub asked_date_time: Option<DateTime<Utc>>,
    #[validate(length(max = 150))]
    pub offer_refusal_reason: Option<String>,
    #[validate(length(max = 2048))]
    pub offer_response_note: Option<String>,
    #[validate(length(max = 2048))]
    pub note: Option<String>,
    /// Version of the entry the caller read
    pub version: i32,
}

// ---------------------------------------------------------------------------
// RentalAgreement
// ---------------------------------------------------------------------------

/// Agreement created from a Yes or force-hire response
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RentalAgreement {
    pub id: i32,
    pub number: String,
    pub equipment_id: i32,
    pub project_id: Option<i32>,
    pub rental_request_id: i32,
    pub rotation_list_entry_id: i32,
    pub local_area_id: i32,
    pub fiscal_year: i32,
    pub status: RentalAgreementStatus,
    pub dated_on: DateTime<Utc>,
    pub estimate_hours: Option<f64>,
    pub estimate_start_work: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Request children removed on cancellation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct HistoryRecord {
    pub id: i32,
    pub rental_request_id: i32,
    pub history_text: String,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RentalRequestNote {
    pub id: i32,
    pub rental_request_id: i32,
    pub text: String,
    pub is_no_longer_relevant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RentalRequestAttachment {
    pub id: i32,
    pub rental_request_id: i32,
    pub file_name: String,
}
