//! Scheduling core and the services built on it

pub mod blocks;
pub mod fiscal;
pub mod jobs;
pub mod rental_requests;
pub mod request_status;
pub mod rollover;
pub mod rotation;
pub mod seniority;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub rental_requests: rental_requests::RentalRequestService,
    pub rollover: rollover::RolloverService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            rental_requests: rental_requests::RentalRequestService::new(repository.clone()),
            rollover: rollover::RolloverService::new(
                repository,
                config.rollover.clone(),
                config.seniority_scoring_rules.clone(),
            ),
        }
    }
}
