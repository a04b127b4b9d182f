//! Job scheduler
//!
//! Admits one job at a time and drives its seeds, strictly in order,
//! through the execution engine or the fan-out driver. After every run it
//! writes progress, counts, labels and usage back to the job, and it
//! finalizes the job's terminal status.

use anyhow::Context;
use chrono::Utc;
use datagen_core::domain::job::{Job, JobError, JobErrorKind, JobStatus};
use datagen_core::domain::pipeline::Pipeline;
use datagen_core::domain::record::RecordStatus;
use datagen_core::domain::seed::Seed;
use datagen_core::domain::usage::ConstraintBreach;
use datagen_core::dto::job::{CreateJob, JobUpdate};
use datagen_core::dto::record::NewRecord;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::admission::AdmissionGate;
use crate::block::BlockRegistry;
use crate::config::EngineConfig;
use crate::context::JobRef;
use crate::error::{EngineError, Result};
use crate::execution::{JobProgress, RunOutput};
use crate::pipeline::PreparedPipeline;
use crate::repository::{JobRepository, PipelineRepository, RecordRepository, Transition};
use crate::service::{ExecutionEngine, FanOutDriver, StopReason, UsageTracker};

/// How the driver loop ended
#[derive(Debug)]
enum Outcome {
    Finished,
    Cancelled,
    Stopped(ConstraintBreach),
    Failed(JobError),
}

/// Handle to a job running in the background
#[derive(Debug)]
pub struct JobHandle {
    job: Job,
    task: JoinHandle<Result<Job>>,
}

impl JobHandle {
    /// The job as created, still pending
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn id(&self) -> Uuid {
        self.job.id
    }

    /// Waits for the job to reach a terminal status
    pub async fn wait(self) -> Result<Job> {
        self.task
            .await
            .map_err(|e| EngineError::TaskFailed(e.to_string()))?
    }
}

/// Background job scheduler
///
/// Cheap to clone; clones share the admission gate and repositories.
#[derive(Clone)]
pub struct JobScheduler {
    config: Arc<EngineConfig>,
    registry: Arc<BlockRegistry>,
    engine: Arc<ExecutionEngine>,
    jobs: Arc<dyn JobRepository>,
    records: Arc<dyn RecordRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    gate: AdmissionGate,
}

impl JobScheduler {
    /// Creates a new scheduler
    pub fn new(
        config: EngineConfig,
        registry: BlockRegistry,
        jobs: Arc<dyn JobRepository>,
        records: Arc<dyn RecordRepository>,
        pipelines: Arc<dyn PipelineRepository>,
    ) -> Self {
        let config = Arc::new(config);
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&config),
            Arc::clone(&jobs),
            Arc::clone(&records),
        ));

        Self {
            config,
            registry: Arc::new(registry),
            engine,
            jobs,
            records,
            pipelines,
            gate: AdmissionGate::new(),
        }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Id of the job currently holding the admission slot
    pub fn active_job(&self) -> Option<Uuid> {
        self.gate.running()
    }

    /// Current snapshot of a job, for status polling
    pub async fn job(&self, job_id: Uuid) -> Result<Job> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or(EngineError::JobNotFound(job_id))
    }

    /// Requests cancellation of a job
    ///
    /// Only marks the job; the running task observes it at its next
    /// checkpoint.
    ///
    /// # Errors
    /// `InvalidState` unless the job is pending or running
    pub async fn cancel(&self, job_id: Uuid) -> Result<Job> {
        let job = self.job(job_id).await?;

        match job.status {
            JobStatus::Pending | JobStatus::Running => {
                let job = self
                    .jobs
                    .update(job_id, JobUpdate::status(JobStatus::Cancelled))
                    .await?;
                info!("Job {} cancellation requested", job_id);
                Ok(job)
            }
            status => Err(EngineError::InvalidState(format!(
                "Cannot cancel job {} in state {}",
                job_id, status
            ))),
        }
    }

    /// Creates a job for `request` and runs it in the background
    ///
    /// The pipeline is resolved before the job is created, so unknown
    /// pipelines or block types never leave a job behind.
    ///
    /// # Errors
    /// * `InvalidRequest` for empty or oversized seed lists
    /// * `PipelineNotFound`, `BlockNotFound`, `InvalidPipeline`
    /// * `JobAlreadyRunning` if another job holds the admission slot
    pub async fn submit(&self, request: CreateJob) -> Result<JobHandle> {
        let total = validate_seeds(&self.config, &request.seeds)?;

        let pipeline = self
            .pipelines
            .find_by_id(request.pipeline_id)
            .await?
            .ok_or(EngineError::PipelineNotFound(request.pipeline_id))?;
        let prepared = PreparedPipeline::prepare(&pipeline, &self.registry)?;

        let job = Job::new(pipeline.id, total);
        let permit = self.gate.try_acquire(job.id)?;
        let job = self.jobs.create(job).await?;

        info!(
            "Submitted job {} for pipeline '{}' ({} seed(s), {} run(s))",
            job.id,
            pipeline.name,
            request.seeds.len(),
            total
        );

        let scheduler = self.clone();
        let job_id = job.id;
        let seeds = request.seeds;
        let task = tokio::spawn(async move {
            // A panicking block fails the job instead of leaving it running
            let runner = scheduler.clone();
            let run = tokio::spawn(async move { runner.run_admitted(job_id, prepared, seeds).await });

            let result = match run.await {
                Ok(result) => result,
                Err(e) => scheduler.fail_aborted(job_id, e).await,
            };
            if let Err(e) = &result {
                error!("Failed to process job {}: {:#}", job_id, e);
            }

            // Release the slot only once the job is terminal
            drop(permit);
            result
        });

        Ok(JobHandle { job, task })
    }

    /// Processes `seeds` for `job` to completion
    ///
    /// Stores the job if it is not stored yet. Definition errors are recorded
    /// on the job, which is returned in its terminal state.
    ///
    /// # Errors
    /// * `InvalidState` unless the job (as stored, if stored) is pending
    /// * `JobAlreadyRunning`, `InvalidRequest`, or storage failures
    pub async fn process(&self, job: Job, pipeline: &Pipeline, seeds: Vec<Seed>) -> Result<Job> {
        if job.pipeline_id != pipeline.id {
            return Err(EngineError::InvalidRequest(format!(
                "job {} belongs to pipeline {}, not {}",
                job.id, job.pipeline_id, pipeline.id
            )));
        }
        let total = validate_seeds(&self.config, &seeds)?;

        let stored = self.jobs.find_by_id(job.id).await?;
        let status = stored.as_ref().map_or(job.status, |stored| stored.status);
        if status != JobStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "Cannot process job {} in state {}",
                job.id, status
            )));
        }

        let permit = self.gate.try_acquire(job.id)?;
        if stored.is_none() {
            self.jobs.create(job.clone()).await?;
        }

        let result = match PreparedPipeline::prepare(pipeline, &self.registry) {
            Ok(prepared) => self.run_admitted(job.id, prepared, seeds).await,
            Err(e) => {
                error!("Job {} cannot start: {}", job.id, e);
                let progress = JobProgress::new(total);
                let tracker = UsageTracker::new(pipeline.constraints);
                self.finalize(job.id, Outcome::Failed(e.to_job_error()), &progress, &tracker)
                    .await
            }
        };

        drop(permit);
        result
    }

    /// Runs an admitted job to its terminal status
    ///
    /// The caller holds the admission permit until this returns.
    async fn run_admitted(
        &self,
        job_id: Uuid,
        pipeline: PreparedPipeline,
        seeds: Vec<Seed>,
    ) -> Result<Job> {
        let mut tracker = UsageTracker::new(*pipeline.constraints());
        let mut progress = JobProgress::new(total_runs(&seeds));

        let outcome = match self
            .drive(job_id, &pipeline, &seeds, &mut tracker, &mut progress)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Job {} failed: {}", job_id, e);
                Outcome::Failed(e.to_job_error())
            }
        };

        self.finalize(job_id, outcome, &progress, &tracker).await
    }

    /// Fails a job whose background task panicked or was aborted
    async fn fail_aborted(&self, job_id: Uuid, e: JoinError) -> Result<Job> {
        let message = if e.is_panic() {
            "job task panicked".to_string()
        } else {
            "job task was aborted".to_string()
        };
        error!("Job {} failed: {}", job_id, message);

        let update = JobUpdate {
            status: Some(JobStatus::Failed),
            error: Some(JobError {
                kind: JobErrorKind::Internal,
                message: message.clone(),
                details: Value::Null,
            }),
            completed_at: Some(Utc::now()),
            ..Default::default()
        };
        self.jobs
            .transition(job_id, &[JobStatus::Pending, JobStatus::Running], update)
            .await
            .with_context(|| format!("Failed to record task failure for job {}", job_id))?;

        Err(EngineError::TaskFailed(message))
    }

    async fn drive(
        &self,
        job_id: Uuid,
        pipeline: &PreparedPipeline,
        seeds: &[Seed],
        tracker: &mut UsageTracker,
        progress: &mut JobProgress,
    ) -> Result<Outcome> {
        let started = self
            .jobs
            .transition(
                job_id,
                &[JobStatus::Pending],
                JobUpdate {
                    status: Some(JobStatus::Running),
                    total_seeds: Some(progress.total),
                    started_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to start job {}", job_id))?;

        if let Transition::Rejected(job) = started {
            if job.status == JobStatus::Cancelled {
                info!("Job {} was cancelled before it started", job_id);
                return Ok(Outcome::Cancelled);
            }
            return Err(EngineError::InvalidState(format!(
                "Cannot start job {} in state {}",
                job_id, job.status
            )));
        }

        info!(
            "Job {} running pipeline '{}' ({} seed(s), fan-out: {})",
            job_id,
            pipeline.name(),
            seeds.len(),
            pipeline.is_fan_out()
        );

        let job_ref = JobRef::Job(job_id);
        let seed_count = seeds.len();

        for (seed_index, seed) in seeds.iter().enumerate() {
            for repetition in 1..=seed.repetitions {
                if pipeline.is_fan_out() {
                    let result = FanOutDriver::new(&self.engine)
                        .run(pipeline, seed.metadata.clone(), job_ref, tracker, progress)
                        .await;

                    match result {
                        Ok(outcome) => match outcome.stop {
                            Some(StopReason::Cancelled) => return Ok(Outcome::Cancelled),
                            Some(StopReason::ConstraintExceeded(breach)) => {
                                return Ok(Outcome::Stopped(breach));
                            }
                            // The driver already reported per-seed progress
                            None => continue,
                        },
                        Err(e) if e.is_isolated() => {
                            warn!("Fan-out expansion failed (job {}): {}", job_id, e);
                            progress.record_failure(&e);
                        }
                        Err(e) => return Err(e),
                    }
                } else {
                    let result = self
                        .engine
                        .execute_for_job(pipeline, seed.metadata.clone(), job_id, tracker)
                        .await;

                    match result {
                        Ok(run) if run.is_cancelled() => return Ok(Outcome::Cancelled),
                        Ok(run) => {
                            self.persist(pipeline, job_id, seed, &run).await?;
                            progress.record_success();
                        }
                        Err(e) if e.is_isolated() => {
                            warn!("Run failed (job {}): {}", job_id, e);
                            progress.record_failure(&e);
                        }
                        Err(e) => return Err(e),
                    }
                }

                progress.finish_run();
                let mut update = progress.to_update(tracker.usage());
                update.current_step = Some(format!(
                    "seed {}/{} run {}/{}",
                    seed_index + 1,
                    seed_count,
                    repetition,
                    seed.repetitions
                ));
                self.jobs.update(job_id, update).await?;

                if let Some(breach) = tracker.exceeded() {
                    info!("Stopping job {}: {}", job_id, breach);
                    return Ok(Outcome::Stopped(breach));
                }
            }

            if self
                .engine
                .checkpoints()
                .after_seed_repetitions(job_ref)
                .await?
                .should_stop()
            {
                info!(
                    "Job {} cancelled after seed {}/{}",
                    job_id,
                    seed_index + 1,
                    seed_count
                );
                return Ok(Outcome::Cancelled);
            }
        }

        Ok(Outcome::Finished)
    }

    /// Persists the record of a finished plain run
    async fn persist(
        &self,
        pipeline: &PreparedPipeline,
        job_id: Uuid,
        seed: &Seed,
        run: &RunOutput,
    ) -> Result<()> {
        let record = self
            .records
            .insert(NewRecord {
                output: run.final_output(),
                metadata: seed.metadata.clone(),
                status: RecordStatus::Pending,
                trace: run.trace.clone(),
                pipeline_id: pipeline.id(),
                job_id: Some(job_id),
                trace_id: run.trace_id,
            })
            .await
            .with_context(|| format!("Failed to persist record for job {}", job_id))?;

        debug!("Persisted record {} (job {})", record.id, job_id);
        Ok(())
    }

    /// Writes the terminal status, counters and completion time
    async fn finalize(
        &self,
        job_id: Uuid,
        outcome: Outcome,
        progress: &JobProgress,
        tracker: &UsageTracker,
    ) -> Result<Job> {
        let (status, error) = match outcome {
            Outcome::Finished if progress.all_failed() => {
                (JobStatus::Failed, progress.first_error.clone())
            }
            Outcome::Finished => (JobStatus::Completed, None),
            Outcome::Cancelled => (JobStatus::Cancelled, None),
            Outcome::Stopped(_) => (JobStatus::Stopped, None),
            Outcome::Failed(error) => (JobStatus::Failed, Some(error)),
        };

        let mut update = progress.to_update(tracker.usage());
        update.status = Some(status);
        update.error = error;
        update.completed_at = Some(Utc::now());

        let allowed = [JobStatus::Pending, JobStatus::Running, status];
        let finalized = self
            .jobs
            .transition(job_id, &allowed, update.clone())
            .await
            .with_context(|| format!("Failed to finalize job {}", job_id))?;

        let job = match finalized {
            Transition::Applied(job) => job,
            // A cancel request that landed after the last checkpoint still wins
            Transition::Rejected(current) if current.status == JobStatus::Cancelled => {
                update.status = None;
                update.error = None;
                self.jobs
                    .update(job_id, update)
                    .await
                    .with_context(|| format!("Failed to finalize job {}", job_id))?
            }
            Transition::Rejected(current) => {
                warn!(
                    "Job {} was already {}; not overwriting it with {}",
                    job_id, current.status, status
                );
                return Ok(current);
            }
        };

        match job.status {
            JobStatus::Failed => error!(
                "Job {} failed ({} generated, {} failed): {}",
                job_id,
                job.records_generated,
                job.records_failed,
                job.error.as_ref().map(|e| e.message.as_str()).unwrap_or("unknown error")
            ),
            _ => info!(
                "Job {} finished with status {} ({} generated, {} failed)",
                job_id, job.status, job.records_generated, job.records_failed
            ),
        }

        Ok(job)
    }
}

/// Total runs requested by `seeds`
fn total_runs(seeds: &[Seed]) -> u64 {
    seeds.iter().map(|seed| u64::from(seed.repetitions)).sum()
}

/// Checks a seed list against the configured limits
///
/// Returns the total number of runs.
fn validate_seeds(config: &EngineConfig, seeds: &[Seed]) -> Result<u64> {
    if seeds.is_empty() {
        return Err(EngineError::InvalidRequest(
            "at least one seed is required".to_string(),
        ));
    }

    for (index, seed) in seeds.iter().enumerate() {
        if seed.repetitions == 0 {
            return Err(EngineError::InvalidRequest(format!(
                "seed {} has zero repetitions",
                index
            )));
        }
        if seed.repetitions > config.max_repetitions {
            return Err(EngineError::InvalidRequest(format!(
                "seed {} requests {} repetitions (max {})",
                index, seed.repetitions, config.max_repetitions
            )));
        }
    }

    let total = total_runs(seeds);
    if total > config.max_seeds as u64 {
        return Err(EngineError::InvalidRequest(format!(
            "{} runs requested (max {})",
            total, config.max_seeds
        )));
    }

    Ok(total)
}
