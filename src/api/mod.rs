//! HTTP surface over the rental request and rollover services

pub mod districts;
pub mod openapi;
pub mod rental_requests;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        .route("/health", get(health_check))
        // Rental requests
        .route("/rental-requests", post(rental_requests::create_rental_request))
        .route(
            "/rental-requests/:id",
            get(rental_requests::get_rental_request)
                .put(rental_requests::update_rental_request)
                .delete(rental_requests::cancel_rental_request),
        )
        .route(
            "/rental-requests/:id/rotation-list",
            put(rental_requests::record_offer_response),
        )
        .route(
            "/rental-requests/:id/history",
            get(rental_requests::get_rental_request_history),
        )
        .route(
            "/rental-requests/:id/agreements",
            get(rental_requests::get_rental_request_agreements),
        )
        // Rollover
        .route(
            "/districts/:id/rollover",
            get(districts::get_rollover_status).post(districts::start_rollover),
        )
        .route(
            "/districts/:id/rollover/dismiss",
            post(districts::dismiss_rollover_message),
        )
        .route("/districts/:id/rollover/cancel", post(districts::cancel_rollover))
        .route(
            "/districts/:id/rollover/jobs/:job_id",
            get(districts::get_rollover_job),
        )
        .route("/districts/:id/fiscal-years", get(districts::get_fiscal_years))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
