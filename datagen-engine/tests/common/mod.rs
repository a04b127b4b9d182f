#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use datagen_core::FieldMap;
use datagen_core::domain::block::{BlockSchema, FieldSet};
use datagen_core::domain::job::{Job, JobStatus};
use datagen_core::domain::pipeline::{BlockSpec, Pipeline};
use datagen_core::domain::record::Record;
use datagen_core::domain::seed::Seed;
use datagen_core::domain::usage::{Constraints, Usage};
use datagen_core::dto::job::{CreateJob, JobUpdate};
use datagen_core::dto::pipeline::CreatePipeline;
use datagen_engine::block::{Block, BlockKind, BlockRegistry, MultiplierBlock};
use datagen_engine::context::ExecutionContext;
use datagen_engine::repository::{
    InMemoryJobRepository, InMemoryPipelineRepository, InMemoryRecordRepository, JobRepository,
    PipelineRepository, RecordRepository, Transition,
};
use datagen_engine::{EngineConfig, JobScheduler, PreparedPipeline};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

// =============================================================================
// Logging
// =============================================================================

/// Install a test-writer subscriber once per test binary.
///
/// Honors `RUST_LOG`; defaults to `datagen_engine=debug`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("datagen_engine=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Data helpers
// =============================================================================

/// Convert a JSON object literal into a field map.
pub fn fields(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn seed(value: Value) -> Seed {
    Seed::new(fields(value))
}

pub fn block(type_name: &str, config: Value) -> BlockSpec {
    BlockSpec::new(type_name).with_config(config)
}

fn schema(type_name: &str, inputs: FieldSet, outputs: FieldSet) -> BlockSchema {
    BlockSchema::new(type_name, "fixtures", inputs, outputs)
}

fn no_fields() -> FieldSet {
    FieldSet::fields(Vec::<String>::new())
}

// =============================================================================
// Fixture blocks
// =============================================================================

/// Standard block backed by a synchronous closure.
struct FnBlock<F> {
    schema: BlockSchema,
    run: F,
}

impl<F> FnBlock<F>
where
    F: Fn(&mut ExecutionContext) -> anyhow::Result<FieldMap> + Send + Sync + 'static,
{
    fn kind(schema: BlockSchema, run: F) -> BlockKind {
        BlockKind::standard(Self { schema, run })
    }
}

#[async_trait]
impl<F> Block for FnBlock<F>
where
    F: Fn(&mut ExecutionContext) -> anyhow::Result<FieldMap> + Send + Sync,
{
    fn schema(&self) -> &BlockSchema {
        &self.schema
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<FieldMap> {
        (self.run)(ctx)
    }
}

/// Splits the seed's `content` into `count` chunks.
struct Chunker {
    schema: BlockSchema,
    count: usize,
    fail: bool,
    expansions: Arc<AtomicUsize>,
}

#[async_trait]
impl MultiplierBlock for Chunker {
    fn schema(&self) -> &BlockSchema {
        &self.schema
    }

    async fn expand(&self, ctx: &mut ExecutionContext) -> anyhow::Result<Vec<FieldMap>> {
        self.expansions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("document could not be split");
        }

        let content = ctx
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok((0..self.count)
            .map(|i| fields(json!({"chunk": format!("{content}#{i}"), "chunk_index": i})))
            .collect())
    }
}

/// Marks the running job as cancelled, optionally only when a field matches.
struct CancelJob {
    schema: BlockSchema,
    jobs: Arc<dyn JobRepository>,
    when: Option<(String, Value)>,
}

#[async_trait]
impl Block for CancelJob {
    fn schema(&self) -> &BlockSchema {
        &self.schema
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<FieldMap> {
        let matches = match &self.when {
            Some((field, value)) => ctx.get(field) == Some(value),
            None => true,
        };

        if let (true, Some(job_id)) = (matches, ctx.job().job_id()) {
            self.jobs
                .update(job_id, JobUpdate::status(JobStatus::Cancelled))
                .await?;
        }
        Ok(FieldMap::new())
    }
}

/// Signals `entered`, then blocks until `release` is notified.
struct WaitForRelease {
    schema: BlockSchema,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Block for WaitForRelease {
    fn schema(&self) -> &BlockSchema {
        &self.schema
    }

    async fn execute(&self, _ctx: &mut ExecutionContext) -> anyhow::Result<FieldMap> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(FieldMap::new())
    }
}

/// Shared handles observed by tests.
#[derive(Clone, Default)]
pub struct Probes {
    /// Number of multiplier expansions
    pub expansions: Arc<AtomicUsize>,
    /// Number of `counter` block executions
    pub executions: Arc<AtomicUsize>,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Probes {
    pub fn expansions(&self) -> usize {
        self.expansions.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

/// Registry with every fixture block type:
///
/// - `generator`: content -> generated
/// - `validator`: generated -> valid, parsed
/// - `static`: returns `config.fields`; outputs default to its keys
/// - `fail`: always raises
/// - `fail_on`: raises when `state[config.field] == config.value`
/// - `usage`: reports `config.input` / `config.output` tokens
/// - `counter`: counts executions
/// - `chunker`: multiplier producing `config.count` chunks
/// - `cancel`: cancels the job (when `config.field == config.value`, if set)
/// - `wait`: holds the run until released
/// - `panic`: panics inside the block
pub fn registry(jobs: Arc<dyn JobRepository>, probes: &Probes) -> BlockRegistry {
    let mut registry = BlockRegistry::new();

    let generator = schema(
        "generator",
        FieldSet::fields(["content"]),
        FieldSet::fields(["generated"]),
    );
    registry.register_fn(generator.clone(), move |_| {
        Ok(FnBlock::kind(generator.clone(), |ctx| {
            let content = ctx
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(fields(json!({
                "generated": {"text": format!("question about {content}")}
            })))
        }))
    });

    let validator = schema(
        "validator",
        FieldSet::fields(["generated"]),
        FieldSet::fields(["valid", "parsed"]),
    );
    registry.register_fn(validator.clone(), move |_| {
        Ok(FnBlock::kind(validator.clone(), |ctx| {
            let generated = ctx.get("generated").cloned().unwrap_or(Value::Null);
            let valid = generated.get("text").is_some();
            let parsed = if valid { generated } else { Value::Null };
            Ok(fields(json!({"valid": valid, "parsed": parsed})))
        }))
    });

    registry.register_fn(schema("static", FieldSet::Any, FieldSet::Any), |config| {
        let output: FieldMap = match config.get("fields") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => FieldMap::new(),
        };
        let outputs = match config.get("outputs") {
            Some(list) => FieldSet::from(serde_json::from_value::<Vec<String>>(list.clone())?),
            None => FieldSet::fields(output.keys().cloned()),
        };
        Ok(FnBlock::kind(
            schema("static", FieldSet::Any, outputs),
            move |_| Ok(output.clone()),
        ))
    });

    let fail = schema("fail", FieldSet::Any, FieldSet::fields(["never"]));
    registry.register_fn(fail.clone(), move |_| {
        Ok(FnBlock::kind(fail.clone(), |_| {
            anyhow::bail!("provider unavailable")
        }))
    });

    let fail_on = schema("fail_on", FieldSet::Any, FieldSet::fields(["checked"]));
    registry.register_fn(fail_on.clone(), move |config| {
        let field = config
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("fail_on requires 'field'"))?
            .to_string();
        let value = config.get("value").cloned().unwrap_or(Value::Null);

        Ok(FnBlock::kind(fail_on.clone(), move |ctx| {
            if ctx.get(&field) == Some(&value) {
                anyhow::bail!("rejected {field} = {value}");
            }
            Ok(fields(json!({"checked": true})))
        }))
    });

    let usage = schema("usage", FieldSet::Any, FieldSet::fields(["tokens_used"]));
    registry.register_fn(usage.clone(), move |config| {
        let input = config.get("input").and_then(Value::as_u64).unwrap_or(0);
        let output = config.get("output").and_then(Value::as_u64).unwrap_or(0);
        let reported = Usage::tokens(input, output, 0);

        Ok(FnBlock::kind(usage.clone(), move |ctx| {
            ctx.record_usage(reported);
            Ok(fields(json!({"tokens_used": reported.total_tokens()})))
        }))
    });

    let counter = schema("counter", FieldSet::Any, no_fields());
    let executions = Arc::clone(&probes.executions);
    registry.register_fn(counter.clone(), move |_| {
        let executions = Arc::clone(&executions);
        Ok(FnBlock::kind(counter.clone(), move |_| {
            executions.fetch_add(1, Ordering::SeqCst);
            Ok(FieldMap::new())
        }))
    });

    let chunker = schema(
        "chunker",
        FieldSet::fields(["content"]),
        FieldSet::fields(["chunk", "chunk_index"]),
    )
    .multiplier();
    let expansions = Arc::clone(&probes.expansions);
    registry.register_fn(chunker.clone(), move |config| {
        let count = config.get("count").and_then(Value::as_u64).unwrap_or(1);
        Ok(BlockKind::multiplier(Chunker {
            schema: chunker.clone(),
            count: usize::try_from(count)?,
            fail: config.get("fail").and_then(Value::as_bool).unwrap_or(false),
            expansions: Arc::clone(&expansions),
        }))
    });

    let cancel = schema("cancel", FieldSet::Any, no_fields());
    registry.register_fn(cancel.clone(), move |config| {
        let when = config
            .get("field")
            .and_then(Value::as_str)
            .map(|field| (field.to_string(), config.get("value").cloned().unwrap_or(Value::Null)));
        Ok(BlockKind::standard(CancelJob {
            schema: cancel.clone(),
            jobs: Arc::clone(&jobs),
            when,
        }))
    });

    let wait = schema("wait", FieldSet::Any, no_fields());
    let entered = Arc::clone(&probes.entered);
    let release = Arc::clone(&probes.release);
    registry.register_fn(wait.clone(), move |_| {
        Ok(BlockKind::standard(WaitForRelease {
            schema: wait.clone(),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        }))
    });

    let panic = schema("panic", FieldSet::Any, no_fields());
    registry.register_fn(panic.clone(), move |_| {
        Ok(FnBlock::kind(panic.clone(), |_| panic!("block panicked")))
    });

    registry
}

// =============================================================================
// Job stores
// =============================================================================

/// Job store where a cancel request lands just before the scheduler moves a
/// job into `target`.
pub struct CancelBeforeTransition {
    inner: Arc<InMemoryJobRepository>,
    target: JobStatus,
}

impl CancelBeforeTransition {
    pub fn wrap(inner: Arc<InMemoryJobRepository>, target: JobStatus) -> Arc<dyn JobRepository> {
        Arc::new(Self { inner, target })
    }
}

#[async_trait]
impl JobRepository for CancelBeforeTransition {
    async fn create(&self, job: Job) -> anyhow::Result<Job> {
        self.inner.create(job).await
    }

    async fn find_by_id(&self, id: uuid::Uuid) -> anyhow::Result<Option<Job>> {
        self.inner.find_by_id(id).await
    }

    async fn update(&self, id: uuid::Uuid, update: JobUpdate) -> anyhow::Result<Job> {
        self.inner.update(id, update).await
    }

    async fn list_by_status(&self, status: JobStatus) -> anyhow::Result<Vec<Job>> {
        self.inner.list_by_status(status).await
    }

    async fn transition(
        &self,
        id: uuid::Uuid,
        from: &[JobStatus],
        update: JobUpdate,
    ) -> anyhow::Result<Transition> {
        if update.status == Some(self.target) {
            self.inner
                .update(id, JobUpdate::status(JobStatus::Cancelled))
                .await?;
        }
        self.inner.transition(id, from, update).await
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub jobs: Arc<InMemoryJobRepository>,
    pub records: Arc<InMemoryRecordRepository>,
    pub pipelines: Arc<InMemoryPipelineRepository>,
    pub probes: Probes,
    pub scheduler: JobScheduler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_job_store(config, |jobs| jobs as Arc<dyn JobRepository>)
    }

    /// Build a harness whose scheduler sees the job store through `wrap`.
    ///
    /// `jobs` stays the underlying in-memory store.
    pub fn with_job_store<F>(config: EngineConfig, wrap: F) -> Self
    where
        F: FnOnce(Arc<InMemoryJobRepository>) -> Arc<dyn JobRepository>,
    {
        init_logging();

        let jobs = Arc::new(InMemoryJobRepository::new());
        let records = Arc::new(InMemoryRecordRepository::new());
        let pipelines = Arc::new(InMemoryPipelineRepository::new());
        let probes = Probes::default();

        let store = wrap(jobs.clone());
        let registry = registry(Arc::clone(&store), &probes);
        let scheduler = JobScheduler::new(
            config,
            registry,
            store,
            records.clone(),
            pipelines.clone(),
        );

        Self {
            jobs,
            records,
            pipelines,
            probes,
            scheduler,
        }
    }

    /// Save a pipeline without constraints.
    pub async fn pipeline(&self, blocks: Vec<BlockSpec>) -> Pipeline {
        self.pipeline_with(blocks, Constraints::default()).await
    }

    pub async fn pipeline_with(&self, blocks: Vec<BlockSpec>, constraints: Constraints) -> Pipeline {
        let pipeline = CreatePipeline {
            name: "test pipeline".to_string(),
            description: None,
            blocks,
            constraints,
        }
        .into_pipeline();
        self.pipelines.save(pipeline).await.unwrap()
    }

    pub fn prepare(&self, pipeline: &Pipeline) -> PreparedPipeline {
        PreparedPipeline::prepare(pipeline, self.scheduler.registry()).unwrap()
    }

    /// Submit a job and wait for it to reach a terminal state.
    pub async fn run_job(&self, pipeline: &Pipeline, seeds: Vec<Seed>) -> Job {
        let handle = self
            .scheduler
            .submit(CreateJob {
                pipeline_id: pipeline.id,
                seeds,
            })
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), handle.wait())
            .await
            .expect("job did not finish in time")
            .unwrap()
    }

    pub async fn records(&self, job_id: uuid::Uuid) -> Vec<Record> {
        self.records.list_by_job(job_id).await.unwrap()
    }
}
