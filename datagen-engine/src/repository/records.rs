//! Records repository

use anyhow::Result;
use async_trait::async_trait;
use datagen_core::domain::record::Record;
use datagen_core::dto::record::NewRecord;
use std::sync::Mutex;
use uuid::Uuid;

use super::lock;

/// Repository trait for generated records
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Inserts a record, assigning its id and creation time
    async fn insert(&self, record: NewRecord) -> Result<Record>;

    /// Finds a record by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Record>>;

    /// Lists the records of a job in insertion order
    async fn list_by_job(&self, job_id: Uuid) -> Result<Vec<Record>>;
}

/// In-memory implementation of RecordRepository
///
/// Records are kept in a single vector so listing preserves insertion order.
#[derive(Default)]
pub struct InMemoryRecordRepository {
    records: Mutex<Vec<Record>>,
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.records, "records")?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn insert(&self, record: NewRecord) -> Result<Record> {
        let record = record.into_record();
        lock(&self.records, "records")?.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Record>> {
        let records = lock(&self.records, "records")?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn list_by_job(&self, job_id: Uuid) -> Result<Vec<Record>> {
        let records = lock(&self.records, "records")?;
        Ok(records
            .iter()
            .filter(|r| r.job_id == Some(job_id))
            .cloned()
            .collect())
    }
}
