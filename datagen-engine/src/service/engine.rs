//! Execution engine
//!
//! Runs a sequence of standard blocks against a growing state mapping:
//! checkpoint, execute, validate the output contract, merge, then trace.
//! The last block also settles the run's final output.

use anyhow::Context;
use datagen_core::FieldMap;
use datagen_core::domain::block::FieldSet;
use datagen_core::domain::record::TraceEntry;
use datagen_core::dto::job::JobUpdate;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::block::Block;
use crate::config::EngineConfig;
use crate::context::{ExecutionContext, JobRef};
use crate::error::{EngineError, Result};
use crate::execution::{Execution, FINAL_OUTPUT_FIELD, JobProgress, RunOutput, RunStatus};
use crate::pipeline::PreparedPipeline;
use crate::repository::{JobRepository, RecordRepository};
use crate::scheduler::checkpoint::{CheckpointSite, Checkpoints};
use crate::service::fan_out::FanOutDriver;
use crate::service::usage::UsageTracker;

/// Executes prepared pipelines
pub struct ExecutionEngine {
    config: Arc<EngineConfig>,
    jobs: Arc<dyn JobRepository>,
    records: Arc<dyn RecordRepository>,
    checkpoints: Checkpoints,
}

impl ExecutionEngine {
    /// Creates a new execution engine
    ///
    /// # Arguments
    /// * `config` - Engine configuration
    /// * `jobs` - Job store, polled by checkpoints and written with progress
    /// * `records` - Record store used by the fan-out path
    pub fn new(
        config: Arc<EngineConfig>,
        jobs: Arc<dyn JobRepository>,
        records: Arc<dyn RecordRepository>,
    ) -> Self {
        let checkpoints = Checkpoints::new(Arc::clone(&jobs));
        Self {
            config,
            jobs,
            records,
            checkpoints,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    pub(crate) fn jobs(&self) -> &dyn JobRepository {
        self.jobs.as_ref()
    }

    pub(crate) fn records(&self) -> &dyn RecordRepository {
        self.records.as_ref()
    }

    /// Runs `pipeline` once outside any job
    ///
    /// Fan-out pipelines yield one output per skeleton; failing seeds are
    /// skipped. Usage is tracked but constraints are not enforced.
    pub async fn execute(&self, pipeline: &PreparedPipeline, initial: FieldMap) -> Result<Execution> {
        let mut tracker = UsageTracker::new(*pipeline.constraints());

        if pipeline.is_fan_out() {
            let mut progress = JobProgress::new(1);
            let outcome = FanOutDriver::new(self)
                .run(pipeline, initial, JobRef::AdHoc, &mut tracker, &mut progress)
                .await?;
            return Ok(Execution::FanOut(outcome.runs));
        }

        let run = self.run(pipeline, initial, JobRef::AdHoc, &mut tracker).await?;
        Ok(Execution::Single(run))
    }

    /// Runs a plain pipeline once on behalf of `job_id`
    ///
    /// Checkpoint 1 is polled before every block; a cancelled job yields a
    /// partial output flagged [`RunStatus::Cancelled`] instead of an error.
    pub async fn execute_for_job(
        &self,
        pipeline: &PreparedPipeline,
        initial: FieldMap,
        job_id: Uuid,
        tracker: &mut UsageTracker,
    ) -> Result<RunOutput> {
        self.run(pipeline, initial, JobRef::Job(job_id), tracker).await
    }

    async fn run(
        &self,
        pipeline: &PreparedPipeline,
        initial: FieldMap,
        job: JobRef,
        tracker: &mut UsageTracker,
    ) -> Result<RunOutput> {
        if pipeline.is_fan_out() {
            return Err(EngineError::InvalidPipeline(format!(
                "pipeline '{}' starts with a multiplier and must run through the fan-out driver",
                pipeline.name()
            )));
        }

        let mut ctx = ExecutionContext::new(job, pipeline.id(), *pipeline.constraints(), initial);
        debug!(
            "Starting run {} of pipeline '{}' (job {})",
            ctx.trace_id(),
            pipeline.name(),
            job
        );

        let status = self
            .run_blocks(pipeline.blocks(), 0, CheckpointSite::BeforeBlock, &mut ctx, tracker)
            .await?;

        if status == RunStatus::Cancelled {
            info!(
                "Run {} cancelled after {} block(s)",
                ctx.trace_id(),
                ctx.trace().len()
            );
        }

        Ok(RunOutput::from_context(ctx, status))
    }

    /// Runs `blocks` in order over `ctx`
    ///
    /// `first_step` is the pipeline position of `blocks[0]`, used in error
    /// context. `site` selects the checkpoint polled before each block.
    pub(crate) async fn run_blocks(
        &self,
        blocks: &[Arc<dyn Block>],
        first_step: usize,
        site: CheckpointSite,
        ctx: &mut ExecutionContext,
        tracker: &mut UsageTracker,
    ) -> Result<RunStatus> {
        let last = blocks.len().saturating_sub(1);

        for (index, block) in blocks.iter().enumerate() {
            let step = first_step + index;
            let schema = block.schema();

            if self.checkpoints.poll(site, ctx.job()).await?.should_stop() {
                return Ok(RunStatus::Cancelled);
            }

            self.report(ctx.job(), JobUpdate::current_block(&schema.type_name))
                .await?;

            let input = ctx.state().clone();
            let started = Instant::now();
            let result = block.execute(ctx).await;
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            tracker.record(&ctx.drain_unsynced_usage());

            let output = result.map_err(|source| {
                EngineError::block_execution(&schema.type_name, step, input.clone(), source)
            })?;

            validate_outputs(&schema.type_name, &schema.outputs, &output)?;
            ctx.merge(&output);

            if index == last {
                settle_final_output(ctx, &self.config.output_field, &schema.outputs);
            }

            if self.config.debug {
                debug!(
                    "Block '{}' (step {}) output: {}",
                    schema.type_name,
                    step,
                    serde_json::Value::Object(output.clone())
                );
                debug!(
                    "Accumulated state after '{}': {}",
                    schema.type_name,
                    serde_json::Value::Object(ctx.state().clone())
                );
            }

            let accumulated_state = ctx.state().clone();
            ctx.push_trace(TraceEntry {
                block_type: schema.type_name.clone(),
                input,
                output,
                accumulated_state,
                duration_ms,
            });
        }

        Ok(RunStatus::Completed)
    }

    /// Writes `update` to the job; no-op for ad-hoc runs
    pub(crate) async fn report(&self, job: JobRef, update: JobUpdate) -> Result<()> {
        if let JobRef::Job(job_id) = job {
            self.jobs
                .update(job_id, update)
                .await
                .with_context(|| format!("Failed to update job {}", job_id))?;
        }
        Ok(())
    }
}

/// Checks that every returned key is a declared output
pub(crate) fn validate_outputs(block_type: &str, declared: &FieldSet, output: &FieldMap) -> Result<()> {
    let FieldSet::Fields(fields) = declared else {
        return Ok(());
    };

    let extra: Vec<String> = output
        .keys()
        .filter(|key| !fields.contains(key))
        .cloned()
        .collect();

    if extra.is_empty() {
        return Ok(());
    }

    Err(EngineError::OutputContract {
        block_type: block_type.to_string(),
        declared: fields.clone(),
        actual: output.keys().cloned().collect(),
        extra,
    })
}

/// Sets the final output unless a block already did
///
/// Falls back to the conventional field if present, else to the accumulated
/// value of the last block's first declared output, else null.
pub(crate) fn settle_final_output(ctx: &mut ExecutionContext, conventional: &str, outputs: &FieldSet) {
    if ctx.get(FINAL_OUTPUT_FIELD).is_some() {
        return;
    }

    let value = ctx
        .get(conventional)
        .or_else(|| outputs.first().and_then(|field| ctx.get(field)))
        .cloned()
        .unwrap_or(Value::Null);

    ctx.insert_if_absent(FINAL_OUTPUT_FIELD, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagen_core::domain::usage::Constraints;
    use serde_json::json;

    fn map(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn context(initial: Value) -> ExecutionContext {
        ExecutionContext::new(JobRef::AdHoc, Uuid::new_v4(), Constraints::default(), map(initial))
    }

    #[test]
    fn test_validate_rejects_extra_keys() {
        let declared = FieldSet::fields(["valid", "parsed"]);
        let output = map(json!({"valid": true, "score": 3}));

        match validate_outputs("validator", &declared, &output).unwrap_err() {
            EngineError::OutputContract {
                declared, extra, ..
            } => {
                assert_eq!(declared, vec!["valid", "parsed"]);
                assert_eq!(extra, vec!["score"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_accepts_subset_and_wildcard() {
        let output = map(json!({"valid": true}));
        assert!(validate_outputs("v", &FieldSet::fields(["valid", "parsed"]), &output).is_ok());
        assert!(validate_outputs("v", &FieldSet::Any, &map(json!({"anything": 1}))).is_ok());
    }

    #[test]
    fn test_final_output_prefers_conventional_field() {
        let mut ctx = context(json!({"assistant": "hi", "valid": true}));
        settle_final_output(&mut ctx, "assistant", &FieldSet::fields(["valid"]));
        assert_eq!(ctx.get(FINAL_OUTPUT_FIELD), Some(&json!("hi")));
    }

    #[test]
    fn test_final_output_falls_back_to_first_declared_output() {
        let mut ctx = context(json!({"generated": "g", "valid": false, "parsed": null}));
        settle_final_output(&mut ctx, "assistant", &FieldSet::fields(["valid", "parsed"]));
        assert_eq!(ctx.get(FINAL_OUTPUT_FIELD), Some(&json!(false)));
    }

    #[test]
    fn test_final_output_is_null_for_wildcard_outputs() {
        let mut ctx = context(json!({"generated": "g"}));
        settle_final_output(&mut ctx, "assistant", &FieldSet::Any);
        assert_eq!(ctx.get(FINAL_OUTPUT_FIELD), Some(&Value::Null));
    }

    #[test]
    fn test_final_output_set_by_a_block_is_kept() {
        let mut ctx = context(json!({"output": "mine", "assistant": "other"}));
        settle_final_output(&mut ctx, "assistant", &FieldSet::fields(["output"]));
        assert_eq!(ctx.get(FINAL_OUTPUT_FIELD), Some(&json!("mine")));
    }
}
