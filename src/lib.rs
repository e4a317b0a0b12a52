//! HETS rotation server
//!
//! Seniority ranking, block partitioning and fair rotation of hired
//! equipment, with the annual per-district rollover that refreshes them.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<services::Services>,
}
