use rand::{rngs::StdRng, RngCore, SeedableRng};
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::cancel::guarded;
use super::error::SampleError;
use super::resolver::{cache_busted, TransferSpec};
use super::transfer::throughput_mbps;

const VISUAL_CEILING_MBPS: f64 = 100.0;
const VISUAL_RAMP_SECS: f64 = 2.0;

pub struct UploadTest<'a> {
    client: &'a reqwest::Client,
    spec: &'a TransferSpec,
    tick: Duration,
}

impl<'a> UploadTest<'a> {
    pub fn new(client: &'a reqwest::Client, spec: &'a TransferSpec, tick: Duration) -> Self {
        Self { client, spec, tick }
    }

    /// POST the whole payload in one request.
    ///
    /// The payload is filled on the blocking pool. Upload progress is not
    /// observable from here, so while the request is in flight a rising
    /// placeholder is published every tick. The real figure overwrites it
    /// once the server answers.
    pub async fn run<F>(self, mut on_sample: F, token: &CancellationToken) -> Result<UploadResult, SampleError>
    where
        F: FnMut(f64),
    {
        let size = self.spec.resource_bytes as usize;
        let data = guarded(token, tokio::task::spawn_blocking(move || random_payload(size)))
            .await?
            .map_err(|e| SampleError::network(format!("payload generation failed: {e}")))?;

        let uploaded = data.len() as u64;
        let url = cache_busted(&self.spec.resource);
        debug!(%url, bytes = uploaded, "upload request");

        let start = Instant::now();
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send();
        tokio::pin!(request);

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let response = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SampleError::aborted()),
                res = &mut request => break res?,
                _ = ticker.tick() => on_sample(visual_estimate(start.elapsed())),
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SampleError::network(format!("HTTP {status}")));
        }

        let elapsed = start.elapsed();
        let avg_speed = throughput_mbps(uploaded, elapsed);
        on_sample(avg_speed);

        info!(
            bytes = uploaded,
            elapsed_ms = elapsed.as_millis() as u64,
            mbps = avg_speed,
            "upload finished"
        );

        Ok(UploadResult {
            uploaded_bytes: uploaded,
            avg_speed_mbps: avg_speed,
        })
    }
}

/// Random bytes, so no middlebox can compress the payload in transit.
fn random_payload(size: usize) -> Vec<u8> {
    let mut rng = StdRng::from_entropy();
    let mut data = vec![0u8; size];
    rng.fill_bytes(&mut data);
    data
}

/// Placeholder shown while the POST is in flight. Strictly increasing in `elapsed`.
pub fn visual_estimate(elapsed: Duration) -> f64 {
    VISUAL_CEILING_MBPS * (1.0 - (-elapsed.as_secs_f64() / VISUAL_RAMP_SECS).exp())
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub uploaded_bytes: u64,
    pub avg_speed_mbps: f64,
}
