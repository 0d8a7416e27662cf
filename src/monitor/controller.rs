use anyhow::{bail, Result};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    Mutex,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    capture::ImageSource,
    classifier::Classifier,
    config::{ConfigError, ImageConfig, MonitorConfig, SceneConfig},
};

use super::events::MonitorEvent;
use super::loop_worker::{monitor_loop, LoopContext};
use super::state::{MonitorStatus, SessionStats};

/// Loop settings taken from the startup config.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub scenes: Vec<SceneConfig>,
    pub active_scene: String,
    pub upload: ImageConfig,
    pub error_backoff: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            scenes: config.scenes.clone(),
            active_scene: config.monitor.default_scene.clone(),
            upload: config.image.clone(),
            error_backoff: config.monitor.error_backoff(),
        }
    }
}

/// Owns the monitor loop task: Idle until `start`, Running until `stop`.
pub struct MonitorController {
    camera: Arc<dyn ImageSource>,
    classifier: Arc<dyn Classifier>,
    settings: MonitorSettings,
    stats: Arc<Mutex<SessionStats>>,
    events: UnboundedSender<MonitorEvent>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl MonitorController {
    /// Returns the controller and the receiving end of its event channel.
    pub fn new(
        camera: Arc<dyn ImageSource>,
        classifier: Arc<dyn Classifier>,
        settings: MonitorSettings,
    ) -> (Self, UnboundedReceiver<MonitorEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            camera,
            classifier,
            settings,
            stats: Arc::new(Mutex::new(SessionStats::new())),
            events,
            handle: None,
            cancel_token: None,
        };
        (controller, receiver)
    }

    pub fn status(&self) -> MonitorStatus {
        if self.handle.is_some() {
            MonitorStatus::Running
        } else {
            MonitorStatus::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == MonitorStatus::Running
    }

    pub async fn stats(&self) -> SessionStats {
        *self.stats.lock().await
    }

    pub fn active_scene(&self) -> Result<&SceneConfig, ConfigError> {
        let name = &self.settings.active_scene;
        self.settings
            .scenes
            .iter()
            .find(|scene| &scene.name == name)
            .ok_or_else(|| ConfigError::UnknownScene(name.clone()))
    }

    /// Choose the preset for the next `start`. A running loop keeps its
    /// interval.
    pub fn select_scene(&mut self, name: &str) -> Result<&SceneConfig, ConfigError> {
        if !self.settings.scenes.iter().any(|scene| scene.name == name) {
            return Err(ConfigError::UnknownScene(name.to_string()));
        }
        self.settings.active_scene = name.to_string();
        if self.is_running() {
            info!("Scene {name} selected; takes effect on next start");
        }
        self.active_scene()
    }

    /// Spawn the loop with the active scene. Must be called within a tokio
    /// runtime.
    pub fn start(&mut self) -> Result<SceneConfig> {
        if self.handle.is_some() {
            bail!("monitoring already active");
        }
        let scene = self.active_scene()?.clone();

        let cancel_token = CancellationToken::new();
        let context = LoopContext {
            scene: scene.clone(),
            camera: Arc::clone(&self.camera),
            classifier: Arc::clone(&self.classifier),
            upload: self.settings.upload.clone(),
            error_backoff: self.settings.error_backoff,
            stats: Arc::clone(&self.stats),
            events: self.events.clone(),
        };

        info!(
            "Starting monitoring with scene {} ({}s interval)",
            scene.name, scene.interval_secs
        );
        let handle = tokio::spawn(monitor_loop(context, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(scene)
    }

    /// Cancel the loop and wait for it to wind down. A no-op when idle.
    pub async fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!("monitor loop task failed to join: {err}");
            }
            info!("Monitoring stopped");
        }
    }
}

impl Drop for MonitorController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use crate::classifier::{ClassificationResult, FailureKind, PostureCategory};
    use crate::monitor::CyclePhase;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc as mpsc_std;
    use std::sync::Mutex as StdMutex;
    use tokio::time::Instant;

    struct FakeCamera {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeCamera {
        fn working() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn broken() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ImageSource for FakeCamera {
        fn capture(&self) -> Result<Vec<u8>, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CaptureError::EmptyCommand)
            } else {
                Ok(b"frame".to_vec())
            }
        }
    }

    enum Scripted {
        Result(ClassificationResult),
        Panic,
    }

    struct ScriptedClassifier {
        calls: AtomicUsize,
        script: StdMutex<VecDeque<Scripted>>,
    }

    impl ScriptedClassifier {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: StdMutex::new(script.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Classifier for ScriptedClassifier {
        fn classify(&self, _image: &[u8]) -> ClassificationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Result(result)) => result,
                Some(Scripted::Panic) => panic!("classifier exploded"),
                None => posture(PostureCategory::Good),
            }
        }
    }

    /// Blocks inside `classify` until the test releases it.
    struct GatedClassifier {
        release: StdMutex<mpsc_std::Receiver<()>>,
        finished: StdMutex<mpsc_std::Sender<()>>,
    }

    impl Classifier for GatedClassifier {
        fn classify(&self, _image: &[u8]) -> ClassificationResult {
            let _ = self.release.lock().unwrap().recv();
            let _ = self.finished.lock().unwrap().send(());
            posture(PostureCategory::Unhealthy)
        }
    }

    fn posture(category: PostureCategory) -> ClassificationResult {
        ClassificationResult {
            present: Some(true),
            posture: Some(category),
            issues: vec!["头部前倾".into()],
            ..Default::default()
        }
    }

    fn settings() -> MonitorSettings {
        MonitorSettings::from_config(&MonitorConfig::default())
    }

    async fn next_result(rx: &mut UnboundedReceiver<MonitorEvent>) -> (ClassificationResult, SessionStats) {
        loop {
            match rx.recv().await.expect("event channel open") {
                MonitorEvent::Result { result, stats, .. } => return (result, stats),
                _ => continue,
            }
        }
    }

    async fn next_capture_at(rx: &mut UnboundedReceiver<MonitorEvent>) -> Instant {
        loop {
            if let MonitorEvent::Phase {
                phase: CyclePhase::Capturing,
            } = rx.recv().await.expect("event channel open")
            {
                return Instant::now();
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counts_checks_and_warnings_over_consecutive_cycles() {
        let classifier = ScriptedClassifier::new(vec![
            Scripted::Result(posture(PostureCategory::Good)),
            Scripted::Result(posture(PostureCategory::NeedsImprovement)),
            Scripted::Result(posture(PostureCategory::Good)),
            Scripted::Result(posture(PostureCategory::Unhealthy)),
            Scripted::Result(posture(PostureCategory::Good)),
        ]);
        let (mut controller, mut rx) =
            MonitorController::new(FakeCamera::working(), classifier.clone(), settings());

        controller.start().unwrap();
        for _ in 0..5 {
            next_result(&mut rx).await;
        }
        controller.stop().await;

        assert_eq!(controller.stats().await, SessionStats { checks: 5, warnings: 2 });
        assert_eq!(classifier.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn alert_follows_a_bad_posture_result() {
        let mut bad = posture(PostureCategory::Unhealthy);
        bad.issues = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let classifier = ScriptedClassifier::new(vec![Scripted::Result(bad)]);
        let (mut controller, mut rx) =
            MonitorController::new(FakeCamera::working(), classifier, settings());

        controller.start().unwrap();
        next_result(&mut rx).await;
        match rx.recv().await.unwrap() {
            MonitorEvent::Alert { issues } => assert_eq!(issues, vec!["a", "b", "c"]),
            other => panic!("expected alert, got {other:?}"),
        }
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn standard_scene_waits_its_interval_between_cycles() {
        let (mut controller, mut rx) = MonitorController::new(
            FakeCamera::working(),
            ScriptedClassifier::new(Vec::new()),
            settings(),
        );
        assert_eq!(controller.active_scene().unwrap().interval_secs, 120);

        controller.start().unwrap();
        let first = next_capture_at(&mut rx).await;
        let second = next_capture_at(&mut rx).await;
        controller.stop().await;

        let gap = second - first;
        assert!(gap >= Duration::from_secs(120), "gap {gap:?}");
        assert!(gap < Duration::from_secs(121), "gap {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn selected_scene_applies_to_the_next_start() {
        let (mut controller, mut rx) = MonitorController::new(
            FakeCamera::working(),
            ScriptedClassifier::new(Vec::new()),
            settings(),
        );

        controller.start().unwrap();
        let scene = controller.select_scene("严格监督").unwrap().clone();
        assert_eq!(scene.interval_secs, 60);
        let first = next_capture_at(&mut rx).await;
        let second = next_capture_at(&mut rx).await;
        assert!(second - first >= Duration::from_secs(120));
        controller.stop().await;

        let started = controller.start().unwrap();
        assert_eq!(started.interval_secs, 60);
        let first = next_capture_at(&mut rx).await;
        let second = next_capture_at(&mut rx).await;
        let gap = second - first;
        assert!(gap >= Duration::from_secs(60) && gap < Duration::from_secs(61), "gap {gap:?}");
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_sleep_halts_further_cycles_promptly() {
        let camera = FakeCamera::working();
        let (mut controller, mut rx) =
            MonitorController::new(camera.clone(), ScriptedClassifier::new(Vec::new()), settings());

        controller.start().unwrap();
        next_result(&mut rx).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        let requested = Instant::now();
        controller.stop().await;
        assert!(requested.elapsed() < Duration::from_secs(1));
        assert!(!controller.is_running());

        tokio::time::advance(Duration::from_secs(600)).await;
        tokio::task::yield_now().await;
        assert_eq!(camera.calls(), 1);

        let mut saw_stopped = false;
        while let Ok(event) = rx.try_recv() {
            assert!(
                !matches!(event, MonitorEvent::Phase { phase: CyclePhase::Capturing }),
                "captured after stop"
            );
            saw_stopped |= matches!(event, MonitorEvent::Stopped { .. });
        }
        assert!(saw_stopped);
    }

    #[tokio::test]
    async fn stop_during_analysis_discards_the_late_result() {
        let (release_tx, release_rx) = mpsc_std::channel();
        let (finished_tx, finished_rx) = mpsc_std::channel();
        let classifier = Arc::new(GatedClassifier {
            release: StdMutex::new(release_rx),
            finished: StdMutex::new(finished_tx),
        });
        let (mut controller, mut rx) =
            MonitorController::new(FakeCamera::working(), classifier, settings());

        controller.start().unwrap();
        loop {
            if let MonitorEvent::Phase {
                phase: CyclePhase::Analyzing,
            } = rx.recv().await.expect("event channel open")
            {
                break;
            }
        }

        let requested = std::time::Instant::now();
        controller.stop().await;
        assert!(requested.elapsed() < Duration::from_secs(1));
        assert!(!controller.is_running());

        release_tx.send(()).unwrap();
        tokio::task::spawn_blocking(move || finished_rx.recv())
            .await
            .unwrap()
            .unwrap();
        tokio::task::yield_now().await;

        assert_eq!(controller.stats().await, SessionStats::new());
        let mut saw_stopped = false;
        while let Ok(event) = rx.try_recv() {
            assert!(
                !matches!(event, MonitorEvent::Result { .. } | MonitorEvent::Alert { .. }),
                "reported after stop: {event:?}"
            );
            saw_stopped |= matches!(event, MonitorEvent::Stopped { .. });
        }
        assert!(saw_stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_when_idle_is_a_no_op() {
        let (mut controller, _rx) = MonitorController::new(
            FakeCamera::working(),
            ScriptedClassifier::new(Vec::new()),
            settings(),
        );
        controller.stop().await;
        assert_eq!(controller.status(), MonitorStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_is_rejected() {
        let (mut controller, _rx) = MonitorController::new(
            FakeCamera::working(),
            ScriptedClassifier::new(Vec::new()),
            settings(),
        );
        controller.start().unwrap();
        assert!(controller.start().is_err());
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failure_skips_the_classifier() {
        let classifier = ScriptedClassifier::new(Vec::new());
        let (mut controller, mut rx) =
            MonitorController::new(FakeCamera::broken(), classifier.clone(), settings());

        controller.start().unwrap();
        let (result, stats) = next_result(&mut rx).await;
        controller.stop().await;

        assert_eq!(classifier.calls(), 0);
        assert!(result.error.as_deref().unwrap().starts_with("capture failed"));
        assert_eq!(
            serde_json::to_value(&result).unwrap().as_object().map(|o| o.len()),
            Some(1)
        );
        assert_eq!(stats, SessionStats { checks: 1, warnings: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn network_failure_retries_after_backoff() {
        let classifier = ScriptedClassifier::new(vec![Scripted::Result(
            ClassificationResult::failure(FailureKind::Network, "request timed out after 60s"),
        )]);
        let (mut controller, mut rx) =
            MonitorController::new(FakeCamera::working(), classifier, settings());

        controller.start().unwrap();
        let first = next_capture_at(&mut rx).await;
        let (result, _) = next_result(&mut rx).await;
        assert_eq!(result.error.as_deref(), Some("request timed out after 60s"));
        let second = next_capture_at(&mut rx).await;
        controller.stop().await;

        let gap = second - first;
        assert!(gap >= Duration::from_secs(10) && gap < Duration::from_secs(11), "gap {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_cycle_is_reported_and_the_loop_continues() {
        let classifier = ScriptedClassifier::new(vec![Scripted::Panic]);
        let (mut controller, mut rx) =
            MonitorController::new(FakeCamera::working(), classifier.clone(), settings());

        controller.start().unwrap();
        let (failed, _) = next_result(&mut rx).await;
        assert_eq!(failed.failure, Some(FailureKind::Internal));

        let (recovered, stats) = next_result(&mut rx).await;
        assert!(!recovered.is_error());
        assert_eq!(stats.checks, 2);
        assert_eq!(classifier.calls(), 2);
        assert!(controller.is_running());
        controller.stop().await;
    }
}
