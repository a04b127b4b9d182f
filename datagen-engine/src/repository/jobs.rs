//! Jobs repository
//!
//! Handles storage of job rows:
//! - Creating pending jobs
//! - Reading a job (the scheduler polls this for cancellation)
//! - Partial updates of progress, labels, usage and status

use anyhow::Result;
use async_trait::async_trait;
use datagen_core::domain::job::{Job, JobStatus};
use datagen_core::dto::job::JobUpdate;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::lock;

/// Repository trait for job storage
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Stores a new job
    async fn create(&self, job: Job) -> Result<Job>;

    /// Finds a job by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>>;

    /// Applies a partial update and returns the updated job
    ///
    /// # Arguments
    /// * `id` - The ID of the job to update
    /// * `update` - Fields to write; unset fields are left untouched
    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<Job>;

    /// Lists jobs with the given status, oldest first
    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;

    /// Applies `update` only while the job's status is one of `from`
    ///
    /// The check and the write are atomic, so a concurrent cancel request is
    /// never overwritten. When the status has moved on nothing is written
    /// and the current job is returned as [`Transition::Rejected`].
    async fn transition(
        &self,
        id: Uuid,
        from: &[JobStatus],
        update: JobUpdate,
    ) -> Result<Transition>;
}

/// Outcome of a conditional status transition
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The update was written
    Applied(Job),
    /// The job was in another status; nothing was written
    Rejected(Job),
}

impl Transition {
    pub fn job(&self) -> &Job {
        match self {
            Transition::Applied(job) | Transition::Rejected(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            Transition::Applied(job) | Transition::Rejected(job) => job,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// In-memory implementation of JobRepository
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: Job) -> Result<Job> {
        let mut jobs = lock(&self.jobs, "jobs")?;
        if jobs.contains_key(&job.id) {
            anyhow::bail!("Job {} already exists", job.id);
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        let jobs = lock(&self.jobs, "jobs")?;
        Ok(jobs.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<Job> {
        let mut jobs = lock(&self.jobs, "jobs")?;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("Job {} not found", id))?;
        update.apply(job);
        Ok(job.clone())
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let jobs = lock(&self.jobs, "jobs")?;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|job| job.created_at);
        Ok(matching)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[JobStatus],
        update: JobUpdate,
    ) -> Result<Transition> {
        let mut jobs = lock(&self.jobs, "jobs")?;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("Job {} not found", id))?;

        if !from.contains(&job.status) {
            return Ok(Transition::Rejected(job.clone()));
        }
        update.apply(job);
        Ok(Transition::Applied(job.clone()))
    }
}
