use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{ErrorCause, RunError};
use super::ping::PingTest;
use super::resolver::{resolve_download, resolve_upload, NominalSize};
use super::transfer::{measure_transfer, Direction};
use super::{Metric, Phase, RunStatus, SpeedTestResult, TestUpdate};
use crate::settings::Settings;

struct Shared {
    status: RunStatus,
    /// Present only while a run is in flight.
    token: Option<CancellationToken>,
    result: SpeedTestResult,
    last_error: Option<RunError>,
}

/// Runs download, upload and latency measurements one after another.
///
/// At most one run is active at a time. Progress is observed through the
/// receiver returned by [`TestRunner::new`], never through return values.
#[derive(Clone)]
pub struct TestRunner {
    client: reqwest::Client,
    settings: Arc<Settings>,
    shared: Arc<Mutex<Shared>>,
    updates: mpsc::UnboundedSender<TestUpdate>,
}

impl TestRunner {
    pub fn new(settings: Settings) -> reqwest::Result<(Self, mpsc::UnboundedReceiver<TestUpdate>)> {
        let client = settings.build_client()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(
        client: reqwest::Client,
        settings: Settings,
    ) -> (Self, mpsc::UnboundedReceiver<TestUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let runner = Self {
            client,
            settings: Arc::new(settings),
            shared: Arc::new(Mutex::new(Shared {
                status: RunStatus::Idle,
                token: None,
                result: SpeedTestResult::default(),
                last_error: None,
            })),
            updates,
        };
        (runner, rx)
    }

    pub fn status(&self) -> RunStatus {
        self.lock().status
    }

    pub fn snapshot(&self) -> SpeedTestResult {
        self.lock().result.clone()
    }

    pub fn last_error(&self) -> Option<RunError> {
        self.lock().last_error.clone()
    }

    /// Begin a run. Ignored, returning `false`, while another run is in flight.
    pub fn start(&self, size: NominalSize) -> bool {
        let token = {
            let mut shared = self.lock();
            if shared.status.is_measuring() {
                debug!(status = %shared.status, "start ignored, run already active");
                return false;
            }

            shared.result = SpeedTestResult::default();
            shared.last_error = None;
            let token = CancellationToken::new();
            shared.token = Some(token.clone());
            self.transition(&mut shared, RunStatus::MeasuringDownload);
            token
        };

        info!(%size, "speed test started");
        let runner = self.clone();
        tokio::spawn(async move { runner.run(size, token).await });
        true
    }

    /// Ask the active run to stop. The switch back to idle happens once the
    /// running sampler notices. Returns `false` when nothing is running.
    pub fn cancel(&self) -> bool {
        let shared = self.lock();
        if !shared.status.is_measuring() {
            return false;
        }
        if let Some(token) = &shared.token {
            info!(status = %shared.status, "cancelling speed test");
            token.cancel();
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The only place `status` changes.
    fn transition(&self, shared: &mut Shared, next: RunStatus) -> bool {
        if !shared.status.can_transition_to(next) {
            warn!(from = %shared.status, to = %next, "illegal status transition");
            return false;
        }
        debug!(from = %shared.status, to = %next, "status");
        shared.status = next;
        let _ = self.updates.send(TestUpdate::Status(next));
        true
    }

    fn advance(&self, next: RunStatus) {
        let mut shared = self.lock();
        self.transition(&mut shared, next);
    }

    fn publish(&self, token: &CancellationToken, metric: Metric, value: f64) {
        // `cancel` signals under the same lock, so nothing escapes once it returns.
        let mut shared = self.lock();
        if token.is_cancelled() {
            return;
        }
        shared.result.record(metric, value);
        let _ = self.updates.send(TestUpdate::Sample(metric, value));
    }

    async fn run(self, size: NominalSize, token: CancellationToken) {
        let outcome = self.run_phases(size, &token).await;

        let mut shared = self.lock();
        shared.token = None;
        match outcome {
            Ok(()) => {
                info!(
                    download_mbps = shared.result.download_mbps,
                    upload_mbps = shared.result.upload_mbps,
                    ping_ms = shared.result.ping_ms,
                    "speed test finished"
                );
                self.transition(&mut shared, RunStatus::Finished);
            }
            Err(e) if e.cause == ErrorCause::Aborted => {
                info!(phase = %e.phase, "speed test cancelled");
                self.transition(&mut shared, RunStatus::Idle);
            }
            Err(e) => {
                warn!(phase = %e.phase, cause = %e.cause, message = %e.message, "speed test failed");
                shared.last_error = Some(e.clone());
                let _ = self.updates.send(TestUpdate::Failed(e));
                self.transition(&mut shared, RunStatus::Failed);
            }
        }
    }

    async fn run_phases(&self, size: NominalSize, token: &CancellationToken) -> Result<(), RunError> {
        let settings = &self.settings;

        let download = resolve_download(&settings.download_url, size);
        debug!(
            resource = %download.resource,
            repetitions = download.repetitions,
            total_bytes = download.total_bytes(),
            "download target"
        );
        measure_transfer(
            &self.client,
            Direction::Download,
            &download,
            |mbps| self.publish(token, Metric::Download, mbps),
            token,
        )
        .await
        .map_err(|e| e.with_phase(Phase::Download))?;

        self.advance(RunStatus::MeasuringUpload);
        let upload = resolve_upload(&settings.upload_url, size, settings.upload_cap_mb);
        measure_transfer(
            &self.client,
            Direction::Upload {
                tick: settings.upload_tick(),
            },
            &upload,
            |mbps| self.publish(token, Metric::Upload, mbps),
            token,
        )
        .await
        .map_err(|e| e.with_phase(Phase::Upload))?;

        self.advance(RunStatus::MeasuringLatency);
        let ping = PingTest::new(
            &self.client,
            &settings.latency_url,
            settings.ping_count,
            settings.ping_interval(),
        )
        .run(|ms| self.publish(token, Metric::Ping, ms), token)
        .await
        .map_err(|e| e.with_phase(Phase::Latency))?;

        self.lock().result.jitter_ms = ping.jitter_ms;
        let _ = self.updates.send(TestUpdate::Jitter(ping.jitter_ms));
        Ok(())
    }
}
