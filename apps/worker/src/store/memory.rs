use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::JobStore;
use crate::error::{WorkerError, WorkerResult};
use crate::job::{JobId, JobRecord, JobStatus};

/// Process-local store, used when no database is configured and in tests
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: Mutex<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with records, as if left behind by an earlier run
    pub fn with_records(records: impl IntoIterator<Item = JobRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|r| (r.id, r)).collect()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<JobId, JobRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stored record, without going through the async trait
    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.records().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &JobRecord) -> WorkerResult<()> {
        self.records().insert(job.id, job.clone());
        Ok(())
    }

    async fn load(&self, id: JobId) -> WorkerResult<Option<JobRecord>> {
        Ok(self.records().get(&id).cloned())
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> WorkerResult<Vec<JobRecord>> {
        let mut jobs: Vec<JobRecord> = self
            .records()
            .values()
            .filter(|job| statuses.contains(&job.status))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn update(&self, job: &JobRecord) -> WorkerResult<()> {
        let mut records = self.records();
        match records.get_mut(&job.id) {
            Some(existing) => {
                if existing.revision <= job.revision {
                    *existing = job.clone();
                }
                Ok(())
            }
            None => Err(WorkerError::NotFound(job.id)),
        }
    }
}
