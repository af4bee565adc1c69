//! Durable job state

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::{JobKind, JobPayload};

/// Opaque job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Paused,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [JobStatus; 6] = [
        Self::Queued,
        Self::Running,
        Self::Paused,
        Self::Succeeded,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Statuses a job can leave again
    pub const ACTIVE: [JobStatus; 3] = [Self::Queued, Self::Running, Self::Paused];

    /// Whether the job has finished for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

/// Three-tier priority, 0 is the most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const HIGH: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(1);
    pub const LOW: Priority = Priority(2);

    /// Create a priority, `None` outside 0..=2
    pub fn new(value: u8) -> Option<Self> {
        (value <= 2).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("priority must be 0, 1 or 2, got {}", value))
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// A unit of work and everything the queue knows about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub payload: JobPayload,
    pub priority: Priority,
    pub status: JobStatus,
    /// Failed attempts that were retried
    pub attempt_count: u32,
    pub max_retries: u32,
    /// Earliest time a queued job may be claimed again
    pub next_run_at: Option<DateTime<Utc>>,
    /// Error from the most recent failed attempt
    pub error_message: Option<String>,
    /// Times the job was found running after a restart
    pub recovery_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every change; stores ignore writes older than what they hold
    #[serde(default)]
    pub revision: u64,
    /// Insertion order, breaks `created_at` ties
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl JobRecord {
    /// A fresh queued record
    pub fn new(
        payload: JobPayload,
        priority: Priority,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            payload,
            priority,
            status: JobStatus::Queued,
            attempt_count: 0,
            max_retries,
            next_run_at: None,
            error_message: None,
            recovery_count: 0,
            created_at: now,
            updated_at: now,
            revision: 0,
            seq: 0,
        }
    }

    /// The job type, derived from the payload
    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    /// Whether the job can be claimed at `now`
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Queued && self.next_run_at.map_or(true, |at| at <= now)
    }

    /// Claim order: priority, then creation time, then insertion
    pub(crate) fn claim_key(&self) -> (Priority, DateTime<Utc>, u64) {
        (self.priority, self.created_at, self.seq)
    }

    pub(crate) fn transition(&mut self, status: JobStatus, now: DateTime<Utc>) {
        self.status = status;
        self.touch(now);
    }

    /// Record that the job changed at `now`
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.revision += 1;
    }
}
