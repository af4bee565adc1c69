//! Job persistence
//!
//! The queue keeps the authoritative working set in memory and writes every
//! state change through a [`JobStore`] so a restart can pick up where it
//! left off.

mod memory;
mod postgres;

pub use memory::InMemoryJobStore;
pub use postgres::PgJobStore;

use async_trait::async_trait;

use crate::error::WorkerResult;
use crate::job::{JobId, JobRecord, JobStatus};

/// Durable storage for job records
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug {
    /// Insert a new record
    async fn save(&self, job: &JobRecord) -> WorkerResult<()>;

    /// Fetch one record
    async fn load(&self, id: JobId) -> WorkerResult<Option<JobRecord>>;

    /// Records in any of `statuses`, oldest first
    async fn list_by_status(&self, statuses: &[JobStatus]) -> WorkerResult<Vec<JobRecord>>;

    /// Overwrite an existing record
    ///
    /// A write whose `revision` is older than the stored one is dropped, so
    /// out-of-order write-throughs cannot roll a job back.
    async fn update(&self, job: &JobRecord) -> WorkerResult<()>;
}
