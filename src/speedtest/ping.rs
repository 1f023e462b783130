use reqwest::header::CACHE_CONTROL;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::cancel::guarded;
use super::error::SampleError;
use super::resolver::cache_busted;

pub struct PingTest<'a> {
    client: &'a reqwest::Client,
    url: &'a Url,
    samples: Vec<f64>,
    ping_count: usize,
    interval: Duration,
}

impl<'a> PingTest<'a> {
    pub fn new(client: &'a reqwest::Client, url: &'a Url, ping_count: usize, interval: Duration) -> Self {
        Self {
            client,
            url,
            samples: Vec::new(),
            ping_count,
            interval,
        }
    }

    /// Probe sequentially. A failed probe is skipped; only a run where
    /// every probe failed is an error.
    pub async fn run<F>(&mut self, mut on_sample: F, token: &CancellationToken) -> Result<PingResult, SampleError>
    where
        F: FnMut(f64),
    {
        self.samples.clear();
        let mut last_failure: Option<String> = None;

        for probe in 0..self.ping_count {
            if probe > 0 {
                guarded(token, tokio::time::sleep(self.interval)).await?;
            }

            let url = cache_busted(self.url);
            let start = Instant::now();
            let sent = guarded(token, self.client.head(url).header(CACHE_CONTROL, "no-store").send()).await?;

            match sent {
                Ok(response) if response.status().is_success() => {
                    let rtt = start.elapsed().as_secs_f64() * 1000.0;
                    debug!(probe, rtt_ms = rtt, "latency probe");
                    self.samples.push(rtt);
                    on_sample(mean(&self.samples));
                }
                Ok(response) => {
                    warn!(probe, status = %response.status(), "latency probe rejected");
                    last_failure = Some(format!("HTTP {}", response.status()));
                }
                Err(e) => {
                    warn!(probe, error = %e, "latency probe failed");
                    last_failure = Some(e.to_string());
                }
            }
        }

        if self.samples.is_empty() {
            return Err(SampleError::network(format!(
                "all {} latency probes failed: {}",
                self.ping_count,
                last_failure.unwrap_or_else(|| "no probes sent".to_string())
            )));
        }

        let result = summarize(&self.samples);
        info!(
            avg_ms = result.avg_ms,
            jitter_ms = result.jitter_ms,
            successes = result.successes,
            "latency finished"
        );
        Ok(result)
    }
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn summarize(samples: &[f64]) -> PingResult {
    if samples.is_empty() {
        return PingResult {
            avg_ms: 0.0,
            jitter_ms: 0.0,
            successes: 0,
        };
    }

    let avg = mean(samples);
    let jitter = if samples.len() > 1 {
        let variance: f64 =
            samples.iter().map(|&x| (x - avg).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    PingResult {
        avg_ms: avg,
        jitter_ms: jitter,
        successes: samples.len(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingResult {
    pub avg_ms: f64,
    pub jitter_ms: f64,
    pub successes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::error::ErrorCause;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GAP: Duration = Duration::from_millis(10);

    fn ping_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/__down?bytes=0", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_five_fresh_probes() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/__down"))
            .and(header("cache-control", "no-store"))
            .respond_with(ResponseTemplate::new(200))
            .expect(5)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = ping_url(&server);
        let mut published = Vec::new();

        let result = PingTest::new(&client, &url, 5, GAP)
            .run(|ms| published.push(ms), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.successes, 5);
        assert_eq!(published.len(), 5);
        assert!((published[4] - result.avg_ms).abs() < 1e-9);

        let requests = server.received_requests().await.unwrap();
        let queries: std::collections::HashSet<_> =
            requests.iter().map(|r| r.url.query().unwrap_or("").to_string()).collect();
        assert_eq!(queries.len(), 5);
    }

    #[tokio::test]
    async fn test_failed_probes_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = ping_url(&server);
        let mut published = Vec::new();

        let result = PingTest::new(&client, &url, 5, GAP)
            .run(|ms| published.push(ms), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.successes, 3);
        assert_eq!(published.len(), 3);
        assert!((published[2] - result.avg_ms).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_probes_failing_is_network() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .expect(5)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = ping_url(&server);
        let mut published = 0;

        let err = PingTest::new(&client, &url, 5, GAP)
            .run(|_| published += 1, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.cause, ErrorCause::Network);
        assert!(err.message.contains("500"));
        assert_eq!(published, 0);
    }

    #[tokio::test]
    async fn test_cancel_during_gap() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = ping_url(&server);
        let token = CancellationToken::new();

        let mut test = PingTest::new(&client, &url, 5, Duration::from_secs(30));
        let trigger = token.clone();
        let err = test.run(|_| trigger.cancel(), &token).await.unwrap_err();

        assert!(err.is_aborted());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn test_summarize_mean_and_jitter() {
        let result = summarize(&[10.0, 20.0, 30.0]);
        assert_eq!(result.avg_ms, 20.0);
        assert_eq!(result.jitter_ms, 10.0);
        assert_eq!(result.successes, 3);
    }

    #[test]
    fn test_summarize_single_sample() {
        let result = summarize(&[12.5]);
        assert_eq!(result.avg_ms, 12.5);
        assert_eq!(result.jitter_ms, 0.0);
    }
}
