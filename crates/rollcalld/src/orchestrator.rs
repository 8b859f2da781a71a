//! Orchestrator — spawns one worker thread per configured camera and
//! supervises the run until every worker has reported back.
//!
//! Workers report termination over a channel; the supervise loop is
//! driven by those reports and by the cancellation handle, never by
//! polling thread liveness.

use crate::config::{validate_configs, ConfigError};
use crate::worker::{run_worker, WorkerContext};
use rollcall_store::CameraConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

/// One worker's terminal error, attributed to its camera.
#[derive(Debug, Clone)]
pub struct CameraFailure {
    pub camera: String,
    pub error: String,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0:?}")]
    Workers(Vec<CameraFailure>),
}

pub struct Orchestrator {
    ctx: WorkerContext,
    cancel: Arc<Notify>,
}

impl Orchestrator {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx, cancel: Arc::new(Notify::new()) }
    }

    /// Handle for requesting shutdown. `notify_one` stores a permit, so
    /// a cancellation issued before `run` starts is not lost.
    pub fn cancel_handle(&self) -> Arc<Notify> {
        self.cancel.clone()
    }

    /// Run all cameras to completion. Configuration is validated before
    /// any worker starts; per-camera failures are aggregated, and the
    /// healthy cameras keep running while a sibling fails.
    pub async fn run(&self, configs: &[CameraConfig]) -> Result<(), RunError> {
        validate_configs(configs)?;

        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let mut stops = Vec::with_capacity(configs.len());
        let mut workers = Vec::with_capacity(configs.len());
        let mut failures = Vec::new();

        for config in configs {
            let stop = Arc::new(AtomicBool::new(false));
            let ctx = self.ctx.clone();
            let config = config.clone();
            let tx = report_tx.clone();
            let camera = config.name.clone();
            let thread_stop = stop.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("rollcall-cam-{camera}"))
                .spawn(move || {
                    let report = run_worker(&config, &ctx, &thread_stop);
                    // Receiver gone means the supervisor already bailed.
                    let _ = tx.send(report);
                });

            match spawned {
                Ok(handle) => {
                    stops.push(stop);
                    workers.push((camera, handle));
                }
                Err(e) => failures.push(CameraFailure {
                    camera,
                    error: format!("failed to spawn worker thread: {e}"),
                }),
            }
        }
        drop(report_tx);
        tracing::info!(cameras = workers.len(), "orchestrator running");

        let mut remaining = workers.len();
        let mut cancelled = false;
        while remaining > 0 {
            tokio::select! {
                _ = self.cancel.notified(), if !cancelled => {
                    cancelled = true;
                    tracing::info!("shutdown requested; stopping camera workers");
                    for stop in &stops {
                        stop.store(true, Ordering::Release);
                    }
                }
                report = report_rx.recv() => {
                    let Some(report) = report else {
                        // All senders dropped without reporting: a worker
                        // thread panicked. Joins below attribute it.
                        break;
                    };
                    remaining -= 1;
                    if let Some(error) = report.error {
                        failures.push(CameraFailure { camera: report.camera, error });
                    }
                }
            }
        }

        for (camera, handle) in workers {
            if handle.join().is_err() {
                failures.push(CameraFailure {
                    camera,
                    error: "worker thread panicked".to_string(),
                });
            }
        }

        if failures.is_empty() {
            tracing::info!("all camera workers stopped cleanly");
            Ok(())
        } else {
            Err(RunError::Workers(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{camera_config, test_context, SourceBehavior};
    use std::time::Duration;

    fn configs(names: &[&str]) -> Vec<CameraConfig> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut config = camera_config(name);
                config.id = i as i64 + 1;
                config.source = i.to_string();
                config
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_config_rejected_before_spawn() {
        let (ctx, sink, _attendance) = test_context(vec![], &[]);
        let orchestrator = Orchestrator::new(ctx);

        let err = orchestrator.run(&[]).await.unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::NoCameras)));
        assert_eq!(sink.shows("lobby"), 0);
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected_before_spawn() {
        let (ctx, sink, _attendance) = test_context(
            vec![("lobby", SourceBehavior::Frames(vec![0]))],
            &[],
        );
        let orchestrator = Orchestrator::new(ctx);

        let err = orchestrator.run(&configs(&["lobby", "lobby"])).await.unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::DuplicateCameraName(_))));
        assert_eq!(sink.shows("lobby"), 0);
    }

    #[tokio::test]
    async fn test_failing_camera_does_not_stop_siblings() {
        let (ctx, sink, attendance) = test_context(
            vec![
                ("broken", SourceBehavior::Unopenable),
                ("lobby", SourceBehavior::Frames(vec![10, 10, 10])),
            ],
            &[(7, "Ada", 10)],
        );
        let orchestrator = Orchestrator::new(ctx);

        let err = orchestrator.run(&configs(&["broken", "lobby"])).await.unwrap_err();
        let RunError::Workers(failures) = err else {
            panic!("expected worker failures");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].camera, "broken");

        // The healthy camera ran its full stream and still produced a
        // check-in for the recognized identity.
        assert_eq!(sink.shows("lobby"), 3);
        assert!(sink.closed("lobby"));
        assert!(sink.closed("broken"));
        let record = attendance.record(7, chrono::Utc::now().date_naive()).unwrap();
        assert!(record.check_in_time.is_some());
    }

    #[tokio::test]
    async fn test_all_cameras_clean_is_ok() {
        let (ctx, sink, _attendance) = test_context(
            vec![
                ("lobby", SourceBehavior::Frames(vec![0, 0])),
                ("door", SourceBehavior::Frames(vec![0])),
            ],
            &[],
        );
        let orchestrator = Orchestrator::new(ctx);

        orchestrator.run(&configs(&["lobby", "door"])).await.unwrap();
        assert_eq!(sink.shows("lobby"), 2);
        assert_eq!(sink.shows("door"), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_endless_streams() {
        let (ctx, sink, _attendance) = test_context(
            vec![
                ("lobby", SourceBehavior::Endless(0)),
                ("door", SourceBehavior::Endless(0)),
            ],
            &[],
        );
        let orchestrator = Orchestrator::new(ctx);
        let cancel = orchestrator.cancel_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.notify_one();
        });

        orchestrator.run(&configs(&["lobby", "door"])).await.unwrap();
        assert!(sink.closed("lobby"));
        assert!(sink.closed("door"));
    }

    #[tokio::test]
    async fn test_cancellation_before_run_is_not_lost() {
        let (ctx, sink, _attendance) =
            test_context(vec![("lobby", SourceBehavior::Endless(0))], &[]);
        let orchestrator = Orchestrator::new(ctx);

        orchestrator.cancel_handle().notify_one();
        orchestrator.run(&configs(&["lobby"])).await.unwrap();
        assert!(sink.closed("lobby"));
    }
}
