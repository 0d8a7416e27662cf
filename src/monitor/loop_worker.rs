use anyhow::{Context, Result};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, Mutex};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::{prepare_upload, ImageSource},
    classifier::{ClassificationResult, Classifier, FailureKind},
    config::{ImageConfig, SceneConfig},
};

use super::events::{CyclePhase, MonitorEvent};
use super::state::SessionStats;

const ENABLE_LOGS: bool = true;
use crate::{log_error, log_info, log_warn};

/// Everything one running loop needs. Built by the controller per start.
pub(crate) struct LoopContext {
    pub scene: SceneConfig,
    pub camera: Arc<dyn ImageSource>,
    pub classifier: Arc<dyn Classifier>,
    pub upload: ImageConfig,
    pub error_backoff: Duration,
    pub stats: Arc<Mutex<SessionStats>>,
    pub events: UnboundedSender<MonitorEvent>,
}

enum CycleOutcome {
    /// Sleep the scene interval before the next cycle.
    Completed,
    /// The remote call failed outright; retry after the error backoff.
    Failed,
    /// Stop was requested while a step was in flight.
    Interrupted,
}

impl LoopContext {
    fn emit(&self, event: MonitorEvent) {
        // The receiver going away only means nobody is watching.
        let _ = self.events.send(event);
    }

    fn emit_phase(&self, phase: CyclePhase) {
        self.emit(MonitorEvent::Phase { phase });
    }

    async fn report(&self, result: ClassificationResult) {
        let (stats, flagged) = {
            let mut stats = self.stats.lock().await;
            let flagged = stats.record(&result);
            (*stats, flagged)
        };
        let alert = flagged.then(|| result.alert_issues());

        self.emit(MonitorEvent::Result {
            check: stats.checks,
            result,
            stats,
            at: Local::now(),
        });
        if let Some(issues) = alert {
            log_info!("posture alert raised with {} issue(s)", issues.len());
            self.emit(MonitorEvent::Alert { issues });
        }
    }
}

pub(crate) async fn monitor_loop(ctx: LoopContext, cancel_token: CancellationToken) {
    log_info!(
        "monitor loop started: scene {} every {}s",
        ctx.scene.name,
        ctx.scene.interval_secs
    );
    ctx.emit(MonitorEvent::Started {
        scene: ctx.scene.name.clone(),
        interval_secs: ctx.scene.interval_secs,
    });

    while !cancel_token.is_cancelled() {
        let cycle_start = Instant::now();
        let pause = match run_cycle(&ctx, &cancel_token).await {
            Ok(CycleOutcome::Completed) => {
                log_info!("cycle finished in {}ms", cycle_start.elapsed().as_millis());
                ctx.emit_phase(CyclePhase::Waiting {
                    next_in_secs: ctx.scene.interval_secs,
                });
                ctx.scene.interval()
            }
            Ok(CycleOutcome::Failed) => {
                ctx.emit_phase(CyclePhase::BackingOff {
                    retry_in_secs: ctx.error_backoff.as_secs(),
                });
                ctx.error_backoff
            }
            Ok(CycleOutcome::Interrupted) => break,
            Err(err) => {
                log_error!("monitor cycle failed: {err:?}");
                ctx.report(ClassificationResult::failure(
                    FailureKind::Internal,
                    format!("{err:#}"),
                ))
                .await;
                ctx.emit_phase(CyclePhase::BackingOff {
                    retry_in_secs: ctx.error_backoff.as_secs(),
                });
                ctx.error_backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    let stats = *ctx.stats.lock().await;
    log_info!(
        "monitor loop stopped after {} checks ({} warnings)",
        stats.checks,
        stats.warnings
    );
    ctx.emit(MonitorEvent::Stopped { stats });
}

async fn run_cycle(ctx: &LoopContext, cancel_token: &CancellationToken) -> Result<CycleOutcome> {
    ctx.emit_phase(CyclePhase::Capturing);
    let camera = Arc::clone(&ctx.camera);
    let capture = tokio::task::spawn_blocking(move || camera.capture());
    let captured = tokio::select! {
        joined = capture => joined.context("capture worker join failed")?,
        _ = cancel_token.cancelled() => return Ok(CycleOutcome::Interrupted),
    };

    let image = match captured {
        Ok(bytes) => bytes,
        Err(err) => {
            log_warn!("capture failed: {err}");
            ctx.report(ClassificationResult::failure(
                FailureKind::Capture,
                format!("capture failed: {err}"),
            ))
            .await;
            return Ok(CycleOutcome::Completed);
        }
    };

    if cancel_token.is_cancelled() {
        return Ok(CycleOutcome::Interrupted);
    }

    ctx.emit_phase(CyclePhase::Analyzing);
    let classifier = Arc::clone(&ctx.classifier);
    let upload = ctx.upload.clone();
    let analysis = tokio::task::spawn_blocking(move || {
        let payload = prepare_upload(&image, &upload);
        classifier.classify(&payload)
    });
    let result = tokio::select! {
        joined = analysis => joined.context("analysis worker join failed")?,
        _ = cancel_token.cancelled() => {
            log_info!("stop requested during analysis; discarding in-flight request");
            return Ok(CycleOutcome::Interrupted);
        }
    };

    let outcome = if result.failure == Some(FailureKind::Network) {
        CycleOutcome::Failed
    } else {
        CycleOutcome::Completed
    };
    ctx.report(result).await;
    Ok(outcome)
}
