//! Job handlers, one per job type
//!
//! A handler turns a claimed job into a [`JobOutcome`]. It never returns an
//! error to the pool: failures are classified into retryable and fatal
//! outcomes, and an interrupted token ends the run early.

mod download;
mod metadata_enrich;
mod playlist_sync;

pub use download::{rank_candidates, DownloadHandler, DownloadSettings};
pub use metadata_enrich::MetadataEnrichHandler;
pub use playlist_sync::PlaylistSyncHandler;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::job::{JobKind, JobOutcome, JobRecord};
use crate::pause::JobToken;

/// Executes one job type
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn handle(&self, job: &JobRecord, token: JobToken) -> JobOutcome;
}

/// Handlers by job type
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own kind, replacing any earlier one
    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<JobKind> {
        let mut kinds: Vec<JobKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
