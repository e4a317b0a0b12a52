//! Annual rollover jobs against the in-memory store

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use hets_server::{
    error::{AppError, ErrorCode},
    models::{EquipmentStatus, SeniorityAssignment},
    repository::{LocalAreaBatch, MemoryRepository, RolloverKickoff, RotationStore},
    services::jobs::JobState,
};

use crate::common::*;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
}

/// Excavators in the first local area, dump trucks in the second
fn fleet() -> Arc<MemoryRepository> {
    let repo = seeded_repository();
    for (id, years) in [(1, 5.0), (2, 12.0), (3, 3.0), (4, 9.0), (5, 7.0)] {
        repo.insert_equipment(equipment(id, LOCAL_AREA, EXCAVATOR, years));
    }
    for (id, years) in [(6, 40.0), (7, 2.0)] {
        repo.insert_equipment(equipment(id, SECOND_LOCAL_AREA, DUMP_TRUCK, years));
    }
    let mut archived = equipment(8, LOCAL_AREA, EXCAVATOR, 25.0);
    archived.status = EquipmentStatus::Archived;
    repo.insert_equipment(archived);
    repo
}

/// (seniority, block, position) of one piece of equipment
fn placement(repo: &MemoryRepository, id: i32) -> (Option<f64>, Option<i32>, Option<i32>) {
    let e = repo.equipment(id).unwrap();
    (e.seniority, e.block_number, e.block_position)
}

#[tokio::test]
async fn test_full_rollover_assigns_blocks() {
    let repo = fleet();
    let services = services(&repo, 1);

    let started = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap();
    assert_eq!(started.target_fiscal_year, 2026);
    assert!(!started.resumed);

    let job = wait_for_job(&services, &started).await;
    assert_eq!(job.state, JobState::Completed);

    // 12y, 9y, 7y, 5y, 3y dealt round-robin into two blocks
    assert_eq!(placement(&repo, 2), (Some(720.0), Some(1), Some(1)));
    assert_eq!(placement(&repo, 4), (Some(540.0), Some(2), Some(1)));
    assert_eq!(placement(&repo, 5), (Some(420.0), Some(1), Some(2)));
    assert_eq!(placement(&repo, 1), (Some(300.0), Some(2), Some(2)));
    assert_eq!(placement(&repo, 3), (Some(180.0), Some(1), Some(3)));

    // Years capped at 30, dump truck points
    assert_eq!(placement(&repo, 6), (Some(18000.0), Some(1), Some(1)));
    assert_eq!(placement(&repo, 7), (Some(1200.0), Some(1), Some(2)));

    assert_eq!(placement(&repo, 8), (None, None, None));
    assert_eq!(repo.equipment(2).unwrap().seniority_fiscal_year, Some(2026));
    assert_eq!(repo.equipment(2).unwrap().number_of_blocks, Some(2));

    let status = services.rollover.get_status(DISTRICT).await.unwrap();
    assert_eq!(status.current_fiscal_year, 2026);
    assert_eq!(status.next_fiscal_year, 2027);
    assert_eq!(status.progress_percentage, Some(100));
    assert!(status.display_message);
    assert!(!status.job_running);
    assert_eq!(status.last_error, None);

    let years = services.rollover.get_fiscal_years(DISTRICT).await.unwrap();
    assert_eq!(years, vec!["2026/2027", "2027/2028"]);

    let dismissed = services
        .rollover
        .dismiss_rollover_message(DISTRICT)
        .await
        .unwrap();
    assert!(!dismissed.display_message);
    assert_eq!(dismissed.progress_percentage, None);
    let progress = repo.get_rollover_progress(DISTRICT).await.unwrap().unwrap();
    assert_eq!(progress.progress_percentage, None);
    assert!(!progress.is_unfinished());
}

#[tokio::test]
async fn test_rollover_is_deterministic() {
    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let repo = fleet();
        let services = services(&repo, 1);
        let started = services
            .rollover
            .start_rollover_on(DISTRICT, None, today())
            .await
            .unwrap();
        wait_for_job(&services, &started).await;
        snapshots.push((1..=8).map(|id| placement(&repo, id)).collect::<Vec<_>>());
    }
    assert_eq!(snapshots[0], snapshots[1]);
}

#[tokio::test]
async fn test_already_current_rejected() {
    let repo = fleet();
    let services = services(&repo, 1);

    let err = services
        .rollover
        .start_rollover_on(DISTRICT, None, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::FiscalYearCurrent);

    let status = services.rollover.get_status(DISTRICT).await.unwrap();
    assert_eq!(status.current_fiscal_year, 2025);
    assert_eq!(status.progress_percentage, None);
    assert_eq!(placement(&repo, 1), (None, None, None));
}

#[tokio::test]
async fn test_march_still_previous_fiscal_year() {
    let repo = fleet();
    let services = services(&repo, 1);

    let err = services
        .rollover
        .start_rollover_on(DISTRICT, None, NaiveDate::from_ymd_opt(2026, 3, 31).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::FiscalYearCurrent);
}

#[tokio::test]
async fn test_dismiss_before_completion_is_noop() {
    let repo = fleet();
    let mut status = rollover_status(DISTRICT, 2025);
    status.progress_percentage = Some(40);
    repo.insert_rollover_status(status);
    let services = services(&repo, 1);

    let view = services
        .rollover
        .dismiss_rollover_message(DISTRICT)
        .await
        .unwrap();
    assert_eq!(view.progress_percentage, Some(40));
    assert!(!view.display_message);
}

#[tokio::test]
async fn test_active_without_checkpoint_rejected() {
    let repo = fleet();
    let mut status = rollover_status(DISTRICT, 2025);
    status.progress_percentage = Some(40);
    repo.insert_rollover_status(status);
    let services = services(&repo, 1);

    let err = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RolloverActive);
}

#[tokio::test]
async fn test_unknown_district_not_found() {
    let repo = fleet();
    let services = services(&repo, 1);

    let err = services
        .rollover
        .start_rollover_on(99, None, today())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_resume_skips_committed_local_areas() {
    let repo = fleet();
    repo.begin_rollover(RolloverKickoff {
        district_id: DISTRICT,
        target_fiscal_year: 2026,
        job_id: Uuid::new_v4(),
        scoring_rules: scoring_rules(),
        resume: false,
        started_at: Utc::now(),
    })
    .await
    .unwrap();
    let marked = (1..=5)
        .map(|id| SeniorityAssignment {
            equipment_id: id,
            expected_version: 1,
            seniority: 999.0,
            rank: id,
            block_number: 1,
            block_position: id,
            number_of_blocks: 2,
        })
        .collect();
    repo.save_local_area_batch(LocalAreaBatch {
        district_id: DISTRICT,
        local_area_id: LOCAL_AREA,
        fiscal_year: 2026,
        assignments: marked,
        progress_percentage: 50,
    })
    .await
    .unwrap();

    let services = services(&repo, 1);
    let started = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap();
    assert!(started.resumed);

    let job = wait_for_job(&services, &started).await;
    assert_eq!(job.state, JobState::Completed);

    assert_eq!(placement(&repo, 2), (Some(999.0), Some(1), Some(2)));
    assert_eq!(repo.equipment(2).unwrap().version, 2);
    assert_eq!(placement(&repo, 6), (Some(18000.0), Some(1), Some(1)));

    let status = services.rollover.get_status(DISTRICT).await.unwrap();
    assert_eq!(status.current_fiscal_year, 2026);
}

#[tokio::test]
async fn test_resume_keeps_original_rules() {
    let repo = fleet();
    repo.begin_rollover(RolloverKickoff {
        district_id: DISTRICT,
        target_fiscal_year: 2026,
        job_id: Uuid::new_v4(),
        scoring_rules: json!({ "equipment_score": 10 }),
        resume: false,
        started_at: Utc::now(),
    })
    .await
    .unwrap();

    let services = services(&repo, 1);
    let started = services
        .rollover
        .start_rollover_on(DISTRICT, Some(scoring_rules()), today())
        .await
        .unwrap();
    assert!(started.resumed);
    wait_for_job(&services, &started).await;

    assert_eq!(repo.equipment(2).unwrap().seniority, Some(120.0));
}

#[tokio::test]
async fn test_transient_failures_retried() {
    let repo = fleet();
    let services = flaky_services(&repo, LOCAL_AREA, 2);

    let started = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap();
    let job = wait_for_job(&services, &started).await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(placement(&repo, 2), (Some(720.0), Some(1), Some(1)));
}

#[tokio::test]
async fn test_exhausted_retries_keep_checkpoint() {
    let repo = fleet();
    let services = flaky_services(&repo, SECOND_LOCAL_AREA, 3);

    let started = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap();
    let job = wait_for_job(&services, &started).await;
    assert_eq!(job.state, JobState::Failed);

    let progress = repo.get_rollover_progress(DISTRICT).await.unwrap().unwrap();
    assert!(progress.is_unfinished());
    assert_eq!(progress.last_processed_local_area_id, Some(LOCAL_AREA));
    assert_eq!(progress.job_id, None);

    let status = services.rollover.get_status(DISTRICT).await.unwrap();
    assert_eq!(status.current_fiscal_year, 2025);
    assert_eq!(status.progress_percentage, Some(50));
    assert!(status.last_error.is_some());
    assert!(!status.job_running);

    // First local area committed, second untouched
    assert_eq!(placement(&repo, 2), (Some(720.0), Some(1), Some(1)));
    assert_eq!(placement(&repo, 6), (None, None, None));

    let started = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap();
    assert!(started.resumed);
    let job = wait_for_job(&services, &started).await;
    assert_eq!(job.state, JobState::Completed);

    assert_eq!(repo.equipment(2).unwrap().version, 2);
    assert_eq!(placement(&repo, 6), (Some(18000.0), Some(1), Some(1)));
    let status = services.rollover.get_status(DISTRICT).await.unwrap();
    assert_eq!(status.current_fiscal_year, 2026);
    assert_eq!(status.last_error, None);
}

#[tokio::test]
async fn test_missing_class_rule_fails_without_partial_commit() {
    let repo = fleet();
    let services = services(&repo, 1);

    let rules = json!({ "equipment_score": { "dump_truck": 600 } });
    let started = services
        .rollover
        .start_rollover_on(DISTRICT, Some(rules), today())
        .await
        .unwrap();
    let job = wait_for_job(&services, &started).await;
    assert_eq!(job.state, JobState::Failed);

    for id in 1..=7 {
        assert_eq!(placement(&repo, id), (None, None, None));
    }
    let status = services.rollover.get_status(DISTRICT).await.unwrap();
    assert_eq!(status.current_fiscal_year, 2025);
    assert!(status.last_error.unwrap().contains("equipment_score"));
}

#[tokio::test]
async fn test_malformed_rules_rejected_upfront() {
    let repo = fleet();
    let services = services(&repo, 1);

    let err = services
        .rollover
        .start_rollover_on(DISTRICT, Some(json!({ "equipment_score": "lots" })), today())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));

    let status = services.rollover.get_status(DISTRICT).await.unwrap();
    assert!(!status.job_running);
    assert_eq!(status.progress_percentage, None);
}

#[tokio::test]
async fn test_one_job_per_district() {
    let repo = fleet();
    let services = services(&repo, 1);

    let first = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap();
    let err = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RolloverActive);

    let other = services
        .rollover
        .start_rollover_on(OTHER_DISTRICT, None, today())
        .await
        .unwrap();

    assert_eq!(wait_for_job(&services, &first).await.state, JobState::Completed);
    assert_eq!(wait_for_job(&services, &other).await.state, JobState::Completed);

    let status = services.rollover.get_status(OTHER_DISTRICT).await.unwrap();
    assert_eq!(status.current_fiscal_year, 2026);
}

#[tokio::test]
async fn test_cancelled_job_resumes_later() {
    let repo = fleet();
    let services = services(&repo, 1);

    let started = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap();
    services.rollover.cancel_rollover(DISTRICT).await.unwrap();

    let job = wait_for_job(&services, &started).await;
    assert_eq!(job.state, JobState::Cancelled);
    let status = services.rollover.get_status(DISTRICT).await.unwrap();
    assert_eq!(status.current_fiscal_year, 2025);

    let err = services.rollover.cancel_rollover(DISTRICT).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let started = services
        .rollover
        .start_rollover_on(DISTRICT, None, today())
        .await
        .unwrap();
    assert!(started.resumed);
    assert_eq!(wait_for_job(&services, &started).await.state, JobState::Completed);
    assert_eq!(placement(&repo, 2), (Some(720.0), Some(1), Some(1)));
}

#[tokio::test]
async fn test_resume_interrupted_on_startup() {
    let repo = fleet();
    repo.begin_rollover(RolloverKickoff {
        district_id: DISTRICT,
        target_fiscal_year: 2026,
        job_id: Uuid::new_v4(),
        scoring_rules: scoring_rules(),
        resume: false,
        started_at: Utc::now(),
    })
    .await
    .unwrap();

    let services = services(&repo, 1);
    let resumed = services.rollover.resume_interrupted().await.unwrap();
    assert_eq!(resumed, 1);

    for _ in 0..500 {
        if !services.rollover.get_status(DISTRICT).await.unwrap().job_running {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let status = services.rollover.get_status(DISTRICT).await.unwrap();
    assert_eq!(status.current_fiscal_year, 2026);
}
