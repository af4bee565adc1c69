//! Job records, payloads and handler outcomes

mod outcome;
mod payload;
mod record;

pub use outcome::JobOutcome;
pub use payload::{JobKind, JobPayload, MetadataSourceKind, TrackQuery};
pub use record::{JobId, JobRecord, JobStatus, Priority};
