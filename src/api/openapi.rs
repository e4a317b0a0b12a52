//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{self, districts, rental_requests};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HETS Rotation API",
        version = "1.1.0",
        description = "Hired equipment rotation, seniority and annual rollover",
        license(name = "Apache-2.0", url = "https://www.apache.org/licenses/LICENSE-2.0")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        api::health_check,
        // Rental requests
        rental_requests::create_rental_request,
        rental_requests::get_rental_request,
        rental_requests::update_rental_request,
        rental_requests::record_offer_response,
        rental_requests::cancel_rental_request,
        rental_requests::get_rental_request_history,
        rental_requests::get_rental_request_agreements,
        // Rollover
        districts::start_rollover,
        districts::get_rollover_status,
        districts::dismiss_rollover_message,
        districts::cancel_rollover,
        districts::get_rollover_job,
        districts::get_fiscal_years,
    ),
    components(
        schemas(
            api::HealthResponse,
            // Rental requests
            crate::models::RentalRequest,
            crate::models::RentalRequestDetails,
            crate::models::CreateRentalRequest,
            crate::models::UpdateRentalRequest,
            crate::models::RotationListEntry,
            crate::models::RecordOfferResponse,
            crate::models::RentalAgreement,
            crate::models::HistoryRecord,
            crate::models::RentalRequestStatus,
            crate::models::OfferResponse,
            crate::models::RentalAgreementStatus,
            // Rollover
            districts::StartRolloverRequest,
            crate::models::RolloverStarted,
            crate::models::RolloverStatusView,
            crate::services::jobs::JobProgress,
            crate::services::jobs::JobState,
            // Errors
            crate::error::ErrorCode,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check"),
        (name = "rental_requests", description = "Rental requests and rotation lists"),
        (name = "rollover", description = "Annual district rollover")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
