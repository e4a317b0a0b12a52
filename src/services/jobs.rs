//! Background jobs keyed by district
//!
//! [`JobRegistry`] is the per-district mutual exclusion: at most one live job
//! per district, any number of districts at once. [`TaskQueue`] is the
//! submit/poll/cancel contract; [`TokioTaskQueue`] runs jobs as tokio tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorCode};

/// Reference to a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub district_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum JobState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// How an executor's run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Ran to the end, even if a cancel arrived after the last checkpoint
    Finished,
    /// Stopped early at a checkpoint after a cancel
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub district_id: i32,
    pub percentage: i32,
    pub state: JobState,
}

/// What a running job sees of its registry slot
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub district_id: i32,
    cancel: CancellationToken,
    progress: Arc<AtomicI32>,
}

impl JobContext {
    pub fn report_progress(&self, percentage: i32) {
        self.progress.store(percentage, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct ActiveJob {
    job_id: Uuid,
    cancel: CancellationToken,
    progress: Arc<AtomicI32>,
}

/// Process-wide map from district id to its live job
#[derive(Default)]
pub struct JobRegistry {
    active: Mutex<HashMap<i32, ActiveJob>>,
    finished: Mutex<HashMap<i32, JobProgress>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the district's slot; rejected while another job holds it
    pub fn register(&self, district_id: i32) -> AppResult<JobContext> {
        let mut active = lock(&self.active);
        if let Some(existing) = active.get(&district_id) {
            return Err(AppError::conflict(
                ErrorCode::RolloverActive,
                format!(
                    "Job {} is already running for district {}",
                    existing.job_id, district_id
                ),
            ));
        }

        let context = JobContext {
            job_id: Uuid::new_v4(),
            district_id,
            cancel: CancellationToken::new(),
            progress: Arc::new(AtomicI32::new(0)),
        };
        active.insert(
            district_id,
            ActiveJob {
                job_id: context.job_id,
                cancel: context.cancel.clone(),
                progress: context.progress.clone(),
            },
        );
        Ok(context)
    }

    /// Release the slot and remember how the job ended
    pub fn finish(&self, district_id: i32, job_id: Uuid, state: JobState) {
        let mut active = lock(&self.active);
        let percentage = match active.get(&district_id) {
            Some(job) if job.job_id == job_id => {
                let percentage = job.progress.load(Ordering::Relaxed);
                active.remove(&district_id);
                percentage
            }
            _ => return,
        };
        drop(active);

        lock(&self.finished).insert(
            district_id,
            JobProgress {
                job_id,
                district_id,
                percentage,
                state,
            },
        );
    }

    pub fn is_running(&self, district_id: i32) -> bool {
        lock(&self.active).contains_key(&district_id)
    }

    /// Signal the district's job to stop at its next checkpoint
    pub fn cancel(&self, district_id: i32) -> bool {
        match lock(&self.active).get(&district_id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn progress(&self, handle: &JobHandle) -> Option<JobProgress> {
        if let Some(job) = lock(&self.active).get(&handle.district_id) {
            if job.job_id == handle.job_id {
                return Some(JobProgress {
                    job_id: job.job_id,
                    district_id: handle.district_id,
                    percentage: job.progress.load(Ordering::Relaxed),
                    state: JobState::Running,
                });
            }
        }
        lock(&self.finished)
            .get(&handle.district_id)
            .filter(|p| p.job_id == handle.job_id)
            .cloned()
    }
}

/// Work run by the task queue
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    type Payload: Send + Sync + 'static;

    /// Runs before the job is spawned, with the district slot already held.
    /// An error here releases the slot and is returned from `submit`.
    async fn prepare(&self, context: &JobContext, payload: &Self::Payload) -> AppResult<()>;

    async fn execute(&self, context: JobContext, payload: Self::Payload)
        -> AppResult<JobOutcome>;
}

/// Abstract scheduler for per-district background jobs
#[async_trait]
pub trait TaskQueue: Send + Sync {
    type Payload: Send;

    async fn submit(&self, district_id: i32, payload: Self::Payload) -> AppResult<JobHandle>;
    fn poll(&self, handle: &JobHandle) -> Option<JobProgress>;
    fn cancel(&self, district_id: i32) -> bool;
    fn is_running(&self, district_id: i32) -> bool;
}

/// Runs each job as its own tokio task
pub struct TokioTaskQueue<E: JobExecutor> {
    registry: Arc<JobRegistry>,
    executor: Arc<E>,
}

impl<E: JobExecutor> TokioTaskQueue<E> {
    pub fn new(registry: Arc<JobRegistry>, executor: Arc<E>) -> Self {
        Self { registry, executor }
    }
}

#[async_trait]
impl<E: JobExecutor> TaskQueue for TokioTaskQueue<E> {
    type Payload = E::Payload;

    async fn submit(&self, district_id: i32, payload: E::Payload) -> AppResult<JobHandle> {
        let context = self.registry.register(district_id)?;
        let handle = JobHandle {
            job_id: context.job_id,
            district_id,
        };

        if let Err(e) = self.executor.prepare(&context, &payload).await {
            self.registry
                .finish(district_id, context.job_id, JobState::Failed);
            return Err(e);
        }

        let registry = self.registry.clone();
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let job_id = context.job_id;
            let outcome =
                tokio::spawn(async move { executor.execute(context, payload).await }).await;

            let state = match outcome {
                Ok(Ok(JobOutcome::Stopped)) => JobState::Cancelled,
                Ok(Ok(JobOutcome::Finished)) => JobState::Completed,
                Ok(Err(e)) => {
                    tracing::error!(district_id, %job_id, error = %e, "Job failed");
                    JobState::Failed
                }
                Err(e) => {
                    tracing::error!(district_id, %job_id, error = %e, "Job aborted");
                    JobState::Failed
                }
            };
            registry.finish(district_id, job_id, state);
        });

        Ok(handle)
    }

    fn poll(&self, handle: &JobHandle) -> Option<JobProgress> {
        self.registry.progress(handle)
    }

    fn cancel(&self, district_id: i32) -> bool {
        self.registry.cancel(district_id)
    }

    fn is_running(&self, district_id: i32) -> bool {
        self.registry.is_running(district_id)
    }
}
