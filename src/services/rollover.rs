//! Annual rollover
//!
//! Re-ranks and re-blocks every active equipment of a district for the new
//! fiscal year, one local area at a time. Each local area is committed with
//! its checkpoint, so an interrupted job resumes after the last local area it
//! finished.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::{
    config::RolloverConfig,
    error::{AppError, AppResult, ErrorCode},
    models::{
        DistrictRolloverStatus, Equipment, LocalArea, RolloverStarted, RolloverStatusView,
        SeniorityAssignment,
    },
    repository::{LocalAreaBatch, Repository, RolloverKickoff},
};

use super::{
    blocks, fiscal,
    jobs::{
        JobContext, JobExecutor, JobHandle, JobOutcome, JobProgress, JobRegistry, TaskQueue,
        TokioTaskQueue,
    },
    seniority::{self, EquipmentClass, ScoringRules},
};

/// What a rollover job is asked to do
#[derive(Debug, Clone)]
pub struct RolloverPayload {
    pub target_fiscal_year: i32,
    pub scoring_rules: Value,
    /// Continue from the persisted checkpoint
    pub resume: bool,
}

/// Progress after `done` of `total` local areas. Held below 100 until the
/// fiscal years are flipped.
fn progress_for(done: usize, total: usize) -> i32 {
    if total == 0 {
        return 99;
    }
    ((done * 100 / total) as i32).clamp(1, 99)
}

/// Executes rollover jobs for the task queue
pub struct RolloverWorker {
    repository: Repository,
    config: RolloverConfig,
}

impl RolloverWorker {
    pub fn new(repository: Repository, config: RolloverConfig) -> Self {
        Self { repository, config }
    }

    async fn run(&self, context: &JobContext, payload: &RolloverPayload) -> AppResult<JobOutcome> {
        let district_id = context.district_id;
        let rules = ScoringRules::from_value(&payload.scoring_rules)?;

        let checkpoint = if payload.resume {
            self.repository
                .get_rollover_progress(district_id)
                .await?
                .and_then(|p| p.last_processed_local_area_id)
        } else {
            None
        };

        let mut local_areas = self.repository.list_local_areas(district_id).await?;
        local_areas.sort_by_key(|la| la.id);
        let total = local_areas.len();

        tracing::info!(
            district_id,
            job_id = %context.job_id,
            target_fiscal_year = payload.target_fiscal_year,
            local_areas = total,
            ?checkpoint,
            "Rollover started"
        );

        for (index, local_area) in local_areas.iter().enumerate() {
            if checkpoint.map_or(false, |last| local_area.id <= last) {
                tracing::debug!(district_id, local_area_id = local_area.id, "Already rolled over, skipping");
                continue;
            }
            if context.is_cancelled() {
                tracing::info!(district_id, local_area_id = local_area.id, "Rollover cancelled at checkpoint");
                return Ok(JobOutcome::Stopped);
            }

            let percentage = progress_for(index + 1, total);
            self.save_with_retry(district_id, local_area, &rules, payload.target_fiscal_year, percentage)
                .await?;
            context.report_progress(percentage);
        }

        let status = self
            .repository
            .complete_rollover(district_id, payload.target_fiscal_year)
            .await?;
        context.report_progress(100);

        tracing::info!(
            district_id,
            current_fiscal_year = status.current_fiscal_year,
            "Rollover complete"
        );
        Ok(JobOutcome::Finished)
    }

    /// Compute and save one local area, retrying transient failures with a
    /// fresh read each time
    async fn save_with_retry(
        &self,
        district_id: i32,
        local_area: &LocalArea,
        rules: &ScoringRules,
        fiscal_year: i32,
        percentage: i32,
    ) -> AppResult<()> {
        let max_attempts = self.config.max_batch_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = async {
                let assignments = self.assign_local_area(district_id, local_area.id, rules).await?;
                let count = assignments.len();
                self.repository
                    .save_local_area_batch(LocalAreaBatch {
                        district_id,
                        local_area_id: local_area.id,
                        fiscal_year,
                        assignments,
                        progress_percentage: percentage,
                    })
                    .await?;
                Ok::<usize, AppError>(count)
            }
            .await;

            match result {
                Ok(count) => {
                    tracing::info!(
                        district_id,
                        local_area_id = local_area.id,
                        equipment = count,
                        progress = percentage,
                        "Local area rolled over"
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        district_id,
                        local_area_id = local_area.id,
                        attempt,
                        error = %e,
                        "Local area save failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// New seniority and blocks for every active equipment of a local area
    async fn assign_local_area(
        &self,
        district_id: i32,
        local_area_id: i32,
        rules: &ScoringRules,
    ) -> AppResult<Vec<SeniorityAssignment>> {
        let equipment = self
            .repository
            .list_local_area_equipment(local_area_id)
            .await?;

        let mut by_type: BTreeMap<i32, Vec<Equipment>> = BTreeMap::new();
        for e in equipment.into_iter().filter(|e| e.status.is_active()) {
            by_type.entry(e.district_equipment_type_id).or_default().push(e);
        }

        let mut assignments = Vec::new();
        for (type_id, members) in by_type {
            let equipment_type = self
                .repository
                .get_district_equipment_type(type_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("District equipment type {} not found", type_id))
                })?;

            let class = EquipmentClass::for_type(&equipment_type);
            let ranked = seniority::rank(&members, class, district_id, rules)?;
            assignments.extend(blocks::partition(&ranked, equipment_type.number_of_blocks)?);
        }
        Ok(assignments)
    }
}

#[async_trait]
impl JobExecutor for RolloverWorker {
    type Payload = RolloverPayload;

    async fn prepare(&self, context: &JobContext, payload: &RolloverPayload) -> AppResult<()> {
        self.repository
            .begin_rollover(RolloverKickoff {
                district_id: context.district_id,
                target_fiscal_year: payload.target_fiscal_year,
                job_id: context.job_id,
                scoring_rules: payload.scoring_rules.clone(),
                resume: payload.resume,
                started_at: Utc::now(),
            })
            .await
    }

    async fn execute(
        &self,
        context: JobContext,
        payload: RolloverPayload,
    ) -> AppResult<JobOutcome> {
        let result = self.run(&context, &payload).await;
        if let Err(ref e) = result {
            tracing::error!(
                district_id = context.district_id,
                job_id = %context.job_id,
                error = %e,
                "Rollover aborted, checkpoint kept"
            );
            if let Err(record_err) = self
                .repository
                .record_rollover_failure(context.district_id, e.to_string())
                .await
            {
                tracing::error!(
                    district_id = context.district_id,
                    error = %record_err,
                    "Failed to record rollover failure"
                );
            }
        }
        result
    }
}

/// Rollover operations exposed to the API
#[derive(Clone)]
pub struct RolloverService {
    repository: Repository,
    queue: Arc<dyn TaskQueue<Payload = RolloverPayload>>,
    default_rules: Value,
}

impl RolloverService {
    pub fn new(repository: Repository, config: RolloverConfig, default_rules: Value) -> Self {
        let worker = Arc::new(RolloverWorker::new(repository.clone(), config));
        let queue = Arc::new(TokioTaskQueue::new(Arc::new(JobRegistry::new()), worker));
        Self {
            repository,
            queue,
            default_rules,
        }
    }

    async fn load_status(&self, district_id: i32) -> AppResult<DistrictRolloverStatus> {
        self.repository
            .get_district(district_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("District {} not found", district_id)))?;
        self.repository
            .get_rollover_status(district_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Rollover status for district {} not found", district_id))
            })
    }

    /// Start (or resume) the rollover into the fiscal year containing today
    pub async fn start_rollover(
        &self,
        district_id: i32,
        scoring_rules: Option<Value>,
    ) -> AppResult<RolloverStarted> {
        self.start_rollover_on(district_id, scoring_rules, Utc::now().date_naive())
            .await
    }

    pub async fn start_rollover_on(
        &self,
        district_id: i32,
        scoring_rules: Option<Value>,
        today: NaiveDate,
    ) -> AppResult<RolloverStarted> {
        let status = self.load_status(district_id).await?;
        let target = fiscal::fiscal_start_year(today);

        if status.current_fiscal_year == target {
            return Err(AppError::conflict(
                ErrorCode::FiscalYearCurrent,
                format!(
                    "District {} is already in fiscal year {}",
                    district_id,
                    fiscal::fiscal_year_label(target)
                ),
            ));
        }
        if self.queue.is_running(district_id) {
            return Err(AppError::conflict(
                ErrorCode::RolloverActive,
                format!("A rollover is already running for district {}", district_id),
            ));
        }

        let unfinished = self
            .repository
            .get_rollover_progress(district_id)
            .await?
            .filter(|p| p.is_unfinished());

        let payload = match unfinished {
            Some(progress) if progress.target_fiscal_year == Some(target) => RolloverPayload {
                target_fiscal_year: target,
                scoring_rules: progress.scoring_rules.0,
                resume: true,
            },
            Some(_) => self.fresh_payload(target, scoring_rules)?,
            None => {
                if status.is_active() {
                    return Err(AppError::conflict(
                        ErrorCode::RolloverActive,
                        format!(
                            "A rollover is already active for district {}; dismiss it first",
                            district_id
                        ),
                    ));
                }
                self.fresh_payload(target, scoring_rules)?
            }
        };

        let resumed = payload.resume;
        let handle = self.queue.submit(district_id, payload).await?;

        tracing::info!(
            district_id,
            job_id = %handle.job_id,
            target_fiscal_year = target,
            resumed,
            "Rollover submitted"
        );

        Ok(RolloverStarted {
            job_id: handle.job_id,
            district_id,
            target_fiscal_year: target,
            resumed,
        })
    }

    fn fresh_payload(&self, target: i32, scoring_rules: Option<Value>) -> AppResult<RolloverPayload> {
        let scoring_rules = scoring_rules.unwrap_or_else(|| self.default_rules.clone());
        ScoringRules::from_value(&scoring_rules)?;
        Ok(RolloverPayload {
            target_fiscal_year: target,
            scoring_rules,
            resume: false,
        })
    }

    pub async fn get_status(&self, district_id: i32) -> AppResult<RolloverStatusView> {
        let status = self.load_status(district_id).await?;
        let last_error = self
            .repository
            .get_rollover_progress(district_id)
            .await?
            .and_then(|p| p.last_error);
        Ok(self.view(status, last_error))
    }

    fn view(&self, status: DistrictRolloverStatus, last_error: Option<String>) -> RolloverStatusView {
        RolloverStatusView {
            district_id: status.district_id,
            progress_percentage: status.progress_percentage,
            current_fiscal_year: status.current_fiscal_year,
            next_fiscal_year: status.next_fiscal_year,
            display_message: status.display_rollover_message,
            job_running: self.queue.is_running(status.district_id),
            last_error,
        }
    }

    /// Clear the completion banner; a no-op unless progress reached 100
    pub async fn dismiss_rollover_message(&self, district_id: i32) -> AppResult<RolloverStatusView> {
        self.load_status(district_id).await?;
        let status = self
            .repository
            .dismiss_rollover_message(district_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Rollover status for district {} not found", district_id))
            })?;
        Ok(self.view(status, None))
    }

    /// Ask the running job to stop at its next local-area boundary
    pub async fn cancel_rollover(&self, district_id: i32) -> AppResult<()> {
        self.load_status(district_id).await?;
        if !self.queue.cancel(district_id) {
            return Err(AppError::NotFound(format!(
                "No rollover is running for district {}",
                district_id
            )));
        }
        tracing::info!(district_id, "Rollover cancellation requested");
        Ok(())
    }

    /// Current and next fiscal year labels, e.g. `["2025/2026", "2026/2027"]`
    pub async fn get_fiscal_years(&self, district_id: i32) -> AppResult<Vec<String>> {
        let status = self.load_status(district_id).await?;
        Ok(vec![
            fiscal::fiscal_year_label(status.current_fiscal_year),
            fiscal::fiscal_year_label(status.next_fiscal_year),
        ])
    }

    pub fn job_progress(&self, handle: &JobHandle) -> Option<JobProgress> {
        self.queue.poll(handle)
    }

    /// Resume every rollover left unfinished by a previous process
    pub async fn resume_interrupted(&self) -> AppResult<usize> {
        let mut resumed = 0;
        for progress in self.repository.list_unfinished_rollovers().await? {
            let target = match progress.target_fiscal_year {
                Some(target) => target,
                None => continue,
            };
            if self.queue.is_running(progress.district_id) {
                continue;
            }

            let handle = self
                .queue
                .submit(
                    progress.district_id,
                    RolloverPayload {
                        target_fiscal_year: target,
                        scoring_rules: progress.scoring_rules.0,
                        resume: true,
                    },
                )
                .await?;
            tracing::info!(
                district_id = progress.district_id,
                job_id = %handle.job_id,
                last_processed_local_area_id = ?progress.last_processed_local_area_id,
                "Resuming interrupted rollover"
            );
            resumed += 1;
        }
        Ok(resumed)
    }
}
