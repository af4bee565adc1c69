//! Soulbridge worker library
//!
//! Job orchestration for the Spotify to slskd bridge: a persistent priority
//! queue, a bounded worker pool, retry with exponential backoff, per
//! dependency circuit breakers and pause/resume control.
//!
//! The binary in `main.rs` wires these pieces to the real service clients;
//! tests drive them with in-memory stores, a manual clock and mock servers.

pub mod breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod job;
pub mod pause;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod sources;
pub mod store;

pub use breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, WorkerSettings};
pub use error::{WorkerError, WorkerResult};
pub use handlers::{HandlerRegistry, JobHandler};
pub use job::{JobId, JobKind, JobOutcome, JobPayload, JobRecord, JobStatus, Priority, TrackQuery};
pub use pause::{InterruptReason, JobToken, PauseController};
pub use pool::{Orchestrator, WorkerPool};
pub use queue::{JobQueue, QueueSettings, QueueSnapshot};
pub use retry::RetryPolicy;
pub use store::{InMemoryJobStore, JobStore, PgJobStore};
