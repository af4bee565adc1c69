use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use soulbridge_musicbrainz_client::MusicBrainzClient;
use soulbridge_slskd_client::SlskdClient;
use soulbridge_spotify_client::SpotifyClient;
use soulbridge_worker::breaker::BreakerRegistry;
use soulbridge_worker::clock::{Clock, SystemClock};
use soulbridge_worker::config::Config;
use soulbridge_worker::handlers::{
    DownloadHandler, HandlerRegistry, MetadataEnrichHandler, PlaylistSyncHandler,
};
use soulbridge_worker::pool::WorkerPool;
use soulbridge_worker::queue::JobQueue;
use soulbridge_worker::sources::{MUSICBRAINZ, SLSKD, SPOTIFY};
use soulbridge_worker::store::{InMemoryJobStore, JobStore, PgJobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soulbridge_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Soulbridge worker");

    let config = Config::from_env()?;
    tracing::info!(
        environment = ?config.environment(),
        max_concurrent = config.worker.max_concurrent_jobs,
        download_dir = %config.common.download_dir.display(),
        "Configuration loaded"
    );

    let store: Arc<dyn JobStore> = match &config.common.database {
        Some(database) => Arc::new(
            PgJobStore::connect(database)
                .await
                .context("Failed to connect to job database")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, jobs will not survive a restart");
            Arc::new(InMemoryJobStore::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = Arc::new(JobQueue::new(
        store,
        clock.clone(),
        config.worker.queue_settings(),
    ));
    queue
        .restore()
        .await
        .context("Failed to restore persisted jobs")?;

    let breakers = Arc::new(BreakerRegistry::new(config.worker.breaker_config(), clock));
    breakers.register(&[SLSKD, SPOTIFY, MUSICBRAINZ]);

    let slskd = Arc::new(
        SlskdClient::new(&config.common.slskd).context("Failed to create slskd client")?,
    );
    let musicbrainz = Arc::new(
        MusicBrainzClient::new(&config.common.musicbrainz)
            .context("Failed to create MusicBrainz client")?,
    );

    let mut metadata = MetadataEnrichHandler::new(breakers.clone()).with_source(musicbrainz);
    let mut handlers = HandlerRegistry::new().register(Arc::new(DownloadHandler::new(
        slskd,
        breakers.clone(),
        config.worker.download_settings(config.poll_interval()),
    )));

    match &config.common.spotify {
        Some(spotify_config) => {
            let spotify = Arc::new(
                SpotifyClient::new(spotify_config).context("Failed to create Spotify client")?,
            );
            metadata = metadata.with_source(spotify.clone());
            handlers = handlers.register(Arc::new(PlaylistSyncHandler::new(
                spotify,
                queue.clone(),
                breakers.clone(),
                config.worker.max_retries,
            )));
        }
        None => tracing::warn!("Spotify is not configured, playlist sync is disabled"),
    }
    let handlers = handlers.register(Arc::new(metadata));

    let orchestrator = WorkerPool::new(
        queue,
        handlers,
        config.worker.retry_policy(),
        breakers,
    )
    .start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    let grace = config.worker.shutdown_grace;
    if tokio::time::timeout(grace, orchestrator.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            grace_secs = grace.as_secs(),
            "Running jobs did not stop within the grace period"
        );
    }

    tracing::info!("Soulbridge worker stopped");
    Ok(())
}
