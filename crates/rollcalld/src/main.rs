use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod interfaces;
mod orchestrator;
mod sink;
mod tracker;
mod worker;

#[cfg(test)]
mod testutil;

use cache::GalleryCache;
use config::Config;
use interfaces::LogNotifier;
use orchestrator::{Orchestrator, RunError};
use rollcall_core::FaceEncoder;
use rollcall_store::SqliteStore;
use sink::{FrameExportSink, NullSink, PresentationSink};
use tracker::AttendanceTracker;
use worker::{HwSourceFactory, OrtEncoderFactory, WorkerContext};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(db = %config.db_path.display(), "rollcalld starting");

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let store = Arc::new(SqliteStore::open(&config.db_path).context("opening attendance database")?);
    let cameras = store.list_cameras().context("loading camera configurations")?;

    // The gallery cache embeds reference images with its own encoder
    // instance; workers each load their own.
    let cache_encoder = FaceEncoder::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )
    .context("loading face models for gallery cache")?;

    let roster = Arc::new(GalleryCache::new(
        store.clone(),
        Box::new(cache_encoder),
        config.gallery_max_age,
    ));

    let tracker = Arc::new(AttendanceTracker::new(
        store.clone(),
        Arc::new(LogNotifier),
        config.debounce,
    ));

    let sink: Arc<dyn PresentationSink> = match &config.export_dir {
        Some(dir) => Arc::new(
            FrameExportSink::new(dir)
                .with_context(|| format!("creating export directory {}", dir.display()))?,
        ),
        None => Arc::new(NullSink),
    };

    let ctx = WorkerContext {
        roster,
        tracker: tracker.clone(),
        sink,
        sources: Arc::new(HwSourceFactory),
        encoders: Arc::new(OrtEncoderFactory {
            detector_path: config.detector_model_path(),
            embedder_path: config.embedder_model_path(),
        }),
        max_consecutive_failures: config.max_consecutive_failures,
    };

    let orchestrator = Orchestrator::new(ctx);

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            cancel.notify_one();
        }
    });

    // Surface attendance transitions on the daemon log.
    let mut events = tracker.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(
                name = %event.name,
                date = %event.date,
                transition = ?event.transition,
                "attendance"
            );
        }
    });

    match orchestrator.run(&cameras).await {
        Ok(()) => {
            tracing::info!("rollcalld shutting down");
            Ok(())
        }
        Err(RunError::Config(e)) => Err(e.into()),
        Err(RunError::Workers(failures)) => {
            for failure in &failures {
                tracing::error!(camera = %failure.camera, error = %failure.error, "camera failed");
            }
            anyhow::bail!("{} of {} cameras failed", failures.len(), cameras.len());
        }
    }
}
