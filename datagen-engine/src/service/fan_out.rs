//! Fan-out driver
//!
//! Handles pipelines whose first block is a multiplier:
//! - Expands the seed once into N skeletons and reports N right away
//! - Runs the remaining blocks once per skeleton, each with its own context
//! - Isolates per-seed failures and persists successes immediately
//! - Evaluates constraints after every seed

use anyhow::Context;
use datagen_core::FieldMap;
use datagen_core::domain::block::BlockSchema;
use datagen_core::domain::job::JobStatus;
use datagen_core::domain::record::{RecordStatus, TraceEntry};
use datagen_core::domain::usage::ConstraintBreach;
use datagen_core::dto::job::JobUpdate;
use datagen_core::dto::record::NewRecord;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::context::{ExecutionContext, JobRef};
use crate::error::{EngineError, Result};
use crate::execution::{JobProgress, RunOutput, RunStatus};
use crate::pipeline::PreparedPipeline;
use crate::repository::Transition;
use crate::scheduler::checkpoint::CheckpointSite;
use crate::service::engine::{ExecutionEngine, settle_final_output, validate_outputs};
use crate::service::usage::UsageTracker;

/// Why a fan-out run stopped before processing every skeleton
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Cancelled,
    ConstraintExceeded(ConstraintBreach),
}

/// Result of one fan-out run
#[derive(Debug, Clone)]
pub struct FanOutOutcome {
    /// Outputs of processed seeds, in seed order; failed seeds are absent
    pub runs: Vec<RunOutput>,
    pub stop: Option<StopReason>,
}

/// Drives a multiplier pipeline through the execution engine
pub struct FanOutDriver<'a> {
    engine: &'a ExecutionEngine,
}

impl<'a> FanOutDriver<'a> {
    pub fn new(engine: &'a ExecutionEngine) -> Self {
        Self { engine }
    }

    /// Runs `pipeline` over `initial`
    ///
    /// `progress` counts this run as one pending run on entry; it is widened
    /// to the number of skeletons and advanced after every seed. Constraints
    /// are only enforced for job runs.
    ///
    /// # Errors
    /// Fails if the multiplier itself fails, if any block breaks its output
    /// contract, or on storage errors. Block failures inside a seed are
    /// counted in `progress` instead.
    pub async fn run(
        &self,
        pipeline: &PreparedPipeline,
        initial: FieldMap,
        job: JobRef,
        tracker: &mut UsageTracker,
        progress: &mut JobProgress,
    ) -> Result<FanOutOutcome> {
        let multiplier = pipeline.multiplier().ok_or_else(|| {
            EngineError::InvalidPipeline(format!(
                "pipeline '{}' does not start with a multiplier",
                pipeline.name()
            ))
        })?;
        let multiplier_schema = multiplier.schema();

        // Expansion
        let mut expand_ctx =
            ExecutionContext::new(job, pipeline.id(), *pipeline.constraints(), initial.clone());
        self.engine
            .report(job, JobUpdate::current_block(&multiplier_schema.type_name))
            .await?;

        let started = Instant::now();
        let expanded = multiplier.expand(&mut expand_ctx).await;
        let expand_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracker.record(&expand_ctx.drain_unsynced_usage());

        let skeletons = expanded.map_err(|source| {
            EngineError::block_execution(&multiplier_schema.type_name, 0, initial.clone(), source)
        })?;
        for skeleton in &skeletons {
            validate_outputs(&multiplier_schema.type_name, &multiplier_schema.outputs, skeleton)?;
        }

        let total = skeletons.len();
        progress.expand_run(total as u64);
        self.engine
            .report(job, progress.to_update(tracker.usage()))
            .await?;
        info!(
            "Multiplier '{}' expanded seed into {} skeleton(s) (job {})",
            multiplier_schema.type_name, total, job
        );

        let mut runs = Vec::with_capacity(total);
        let mut stop = None;

        for (index, skeleton) in skeletons.into_iter().enumerate() {
            let k = index + 1;

            if self
                .engine
                .checkpoints()
                .before_seed(job)
                .await?
                .should_stop()
            {
                info!("Fan-out cancelled before seed {}/{} (job {})", k, total, job);
                stop = Some(StopReason::Cancelled);
                break;
            }

            let seed_run = self
                .run_seed(pipeline, multiplier_schema, &initial, skeleton, expand_ms, job, tracker)
                .await;

            match seed_run {
                Ok(run) if run.is_cancelled() => {
                    info!("Fan-out cancelled during seed {}/{} (job {})", k, total, job);
                    runs.push(run);
                    stop = Some(StopReason::Cancelled);
                    break;
                }
                Ok(run) => {
                    self.persist(pipeline, job, &initial, &run).await?;
                    progress.record_success();
                    runs.push(run);
                }
                Err(e) if e.is_isolated() => {
                    warn!("Seed {}/{} failed (job {}): {}", k, total, job, e);
                    progress.record_failure(&e);
                }
                Err(e) => return Err(e),
            }

            progress.finish_run();
            let mut update = progress.to_update(tracker.usage());
            update.current_step = Some(format!("seed {}/{}", k, total));
            self.engine.report(job, update).await?;

            let JobRef::Job(job_id) = job else {
                continue;
            };
            if let Some(breach) = tracker.exceeded() {
                let stopped = self
                    .engine
                    .jobs()
                    .transition(job_id, &[JobStatus::Running], JobUpdate::status(JobStatus::Stopped))
                    .await
                    .with_context(|| format!("Failed to stop job {}", job_id))?;

                if let Transition::Rejected(current) = stopped {
                    info!(
                        "Job {} was {} before it could stop after seed {}/{}",
                        job_id, current.status, k, total
                    );
                    stop = Some(StopReason::Cancelled);
                    break;
                }

                info!("Stopping fan-out after seed {}/{} (job {}): {}", k, total, job, breach);
                stop = Some(StopReason::ConstraintExceeded(breach));
                break;
            }
        }

        Ok(FanOutOutcome { runs, stop })
    }

    /// Runs the remaining blocks over `initial ∪ skeleton`
    #[allow(clippy::too_many_arguments)]
    async fn run_seed(
        &self,
        pipeline: &PreparedPipeline,
        multiplier_schema: &BlockSchema,
        initial: &FieldMap,
        skeleton: FieldMap,
        expand_ms: u64,
        job: JobRef,
        tracker: &mut UsageTracker,
    ) -> Result<RunOutput> {
        let mut state = initial.clone();
        state.extend(skeleton.clone());

        let mut ctx =
            ExecutionContext::new(job, pipeline.id(), *pipeline.constraints(), state.clone());
        ctx.push_trace(TraceEntry {
            block_type: multiplier_schema.type_name.clone(),
            input: initial.clone(),
            output: skeleton,
            accumulated_state: state,
            duration_ms: expand_ms,
        });

        if pipeline.blocks().is_empty() {
            settle_final_output(
                &mut ctx,
                &self.engine.config().output_field,
                &multiplier_schema.outputs,
            );
            return Ok(RunOutput::from_context(ctx, RunStatus::Completed));
        }

        debug!("Running seed {} (job {})", ctx.trace_id(), job);
        let status = self
            .engine
            .run_blocks(
                pipeline.blocks(),
                1,
                CheckpointSite::BeforeSeedBlock,
                &mut ctx,
                tracker,
            )
            .await?;

        Ok(RunOutput::from_context(ctx, status))
    }

    /// Persists a finished seed right away; ad-hoc runs are not persisted
    async fn persist(
        &self,
        pipeline: &PreparedPipeline,
        job: JobRef,
        initial: &FieldMap,
        run: &RunOutput,
    ) -> Result<()> {
        let JobRef::Job(job_id) = job else {
            return Ok(());
        };

        let mut metadata = initial.clone();
        if let Some(skeleton) = run.trace.first() {
            metadata.extend(skeleton.output.clone());
        }

        let record = self
            .engine
            .records()
            .insert(NewRecord {
                output: run.final_output(),
                metadata,
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
}
