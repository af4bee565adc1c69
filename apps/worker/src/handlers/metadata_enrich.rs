use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::JobHandler;
use crate::breaker::BreakerRegistry;
use crate::error::{WorkerError, WorkerResult};
use crate::job::{JobKind, JobOutcome, JobPayload, JobRecord, MetadataSourceKind};
use crate::pause::JobToken;
use crate::sources::{LookupResult, MetadataSource};

/// Handler for [`JobKind::MetadataEnrich`]
///
/// Resolves the job's reference with the source it names. An unknown
/// reference is permanent; an unreachable source is retried.
pub struct MetadataEnrichHandler {
    sources: HashMap<MetadataSourceKind, Arc<dyn MetadataSource>>,
    breakers: Arc<BreakerRegistry>,
}

impl MetadataEnrichHandler {
    pub fn new(breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            sources: HashMap::new(),
            breakers,
        }
    }

    /// Add a source under the kind it reports
    pub fn with_source(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.sources.insert(source.kind(), source);
        self
    }

    async fn lookup(
        &self,
        source: &Arc<dyn MetadataSource>,
        kind: MetadataSourceKind,
        reference: &str,
    ) -> WorkerResult<LookupResult> {
        self.breakers
            .get(kind.dependency())
            .call_filtered(|| source.lookup(reference), WorkerError::is_retryable)
            .await
            .map_err(WorkerError::from)
    }
}

#[async_trait]
impl JobHandler for MetadataEnrichHandler {
    fn kind(&self) -> JobKind {
        JobKind::MetadataEnrich
    }

    async fn handle(&self, job: &JobRecord, token: JobToken) -> JobOutcome {
        let JobPayload::MetadataEnrich {
            source: kind,
            reference,
            file_path,
        } = &job.payload
        else {
            return JobOutcome::fatal(format!("metadata handler cannot run {} jobs", job.kind()));
        };

        let Some(source) = self.sources.get(kind) else {
            return JobOutcome::fatal(format!("metadata source {} is not configured", kind));
        };

        let result = tokio::select! {
            biased;
            _ = token.interrupted() => return JobOutcome::Cancelled,
            result = self.lookup(source, *kind, reference) => result,
        };

        match result {
            Ok(LookupResult::Found(metadata)) => {
                info!(
                    source = %kind,
                    reference = %reference,
                    artist = %metadata.artist,
                    title = %metadata.title,
                    album = metadata.album.as_deref().unwrap_or_default(),
                    file = ?file_path,
                    "Metadata resolved"
                );
                JobOutcome::success(format!(
                    "{}: {} - {}",
                    kind, metadata.artist, metadata.title
                ))
            }
            Ok(LookupResult::NotFound) => {
                JobOutcome::fatal(format!("{} has no match for {}", kind, reference))
            }
            Err(e) => {
                e.log();
                JobOutcome::from_error(&e)
            }
        }
    }
}
