use futures::StreamExt;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::cancel::guarded;
use super::error::SampleError;
use super::resolver::{cache_busted, TransferSpec};
use super::transfer::throughput_mbps;

pub struct DownloadTest<'a> {
    client: &'a reqwest::Client,
    spec: &'a TransferSpec,
}

impl<'a> DownloadTest<'a> {
    pub fn new(client: &'a reqwest::Client, spec: &'a TransferSpec) -> Self {
        Self { client, spec }
    }

    /// Fetch the resource `spec.repetitions` times, back to back.
    ///
    /// Every chunk publishes total bytes over total time since the first
    /// request went out, so the estimate settles instead of jumping around
    /// with per-chunk jitter.
    pub async fn run<F>(self, mut on_sample: F, token: &CancellationToken) -> Result<DownloadResult, SampleError>
    where
        F: FnMut(f64),
    {
        let start = Instant::now();
        let mut downloaded: u64 = 0;

        for repetition in 1..=self.spec.repetitions {
            let url = cache_busted(&self.spec.resource);
            debug!(%url, repetition, of = self.spec.repetitions, "download request");

            let response = guarded(token, self.client.get(url).send()).await??;
            let status = response.status();
            if !status.is_success() {
                return Err(SampleError::network(format!("HTTP {status}")));
            }

            let mut stream = response.bytes_stream();
            let mut received: u64 = 0;

            while let Some(chunk) = guarded(token, stream.next()).await? {
                let chunk = chunk?;
                received += chunk.len() as u64;
                downloaded += chunk.len() as u64;
                on_sample(throughput_mbps(downloaded, start.elapsed()));
            }

            if received == 0 {
                return Err(SampleError::protocol("download response carried no body"));
            }
        }

        let elapsed = start.elapsed();
        let avg_speed = throughput_mbps(downloaded, elapsed);
        on_sample(avg_speed);

        info!(
            bytes = downloaded,
            elapsed_ms = elapsed.as_millis() as u64,
            mbps = avg_speed,
            "download finished"
        );

        Ok(DownloadResult {
            downloaded_bytes: downloaded,
            avg_speed_mbps: avg_speed,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub downloaded_bytes: u64,
    pub avg_speed_mbps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::error::ErrorCause;
    use crate::speedtest::resolver::{resolve_download, NominalSize};
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec_for(server: &MockServer, repetitions: u32) -> TransferSpec {
        TransferSpec {
            resource: Url::parse(&format!("{}/__down", server.uri())).unwrap(),
            repetitions,
            nominal_mb: 1,
            resource_bytes: 65_536,
        }
    }

    #[tokio::test]
    async fn test_download_counts_all_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/__down"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x5Au8; 65_536]))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let spec = spec_for(&server, 1);
        let mut samples = Vec::new();

        let result = DownloadTest::new(&client, &spec)
            .run(|mbps| samples.push(mbps), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.downloaded_bytes, 65_536);
        assert!(result.avg_speed_mbps > 0.0);
        assert!(!samples.is_empty());
        assert_eq!(*samples.last().unwrap(), result.avg_speed_mbps);
    }

    #[tokio::test]
    async fn test_repetitions_run_back_to_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/__down"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 10_000]))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let spec = spec_for(&server, 3);

        let result = DownloadTest::new(&client, &spec)
            .run(|_| {}, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.downloaded_bytes, 30_000);

        // Each repetition gets its own cache-busting parameter.
        let requests = server.received_requests().await.unwrap();
        let queries: std::collections::HashSet<_> =
            requests.iter().map(|r| r.url.query().unwrap_or("").to_string()).collect();
        assert_eq!(queries.len(), 3);
    }

    #[tokio::test]
    async fn test_resolved_spec_requests_sized_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/__down"))
            .and(query_param("bytes", "1000000"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1_000]))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let base = Url::parse(&format!("{}/__down", server.uri())).unwrap();
        let spec = resolve_download(&base, NominalSize::Mb1);

        DownloadTest::new(&client, &spec)
            .run(|_| {}, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_http_error_is_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/__down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let spec = spec_for(&server, 2);

        let err = DownloadTest::new(&client, &spec)
            .run(|_| {}, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.cause, ErrorCause::Network);
        assert!(err.message.contains("503"));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_is_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/__down"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let spec = spec_for(&server, 1);

        let err = DownloadTest::new(&client, &spec)
            .run(|_| {}, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.cause, ErrorCause::Protocol);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network() {
        let client = reqwest::Client::new();
        let spec = TransferSpec {
            resource: Url::parse("http://127.0.0.1:9/__down").unwrap(),
            repetitions: 1,
            nominal_mb: 1,
            resource_bytes: 1,
        };

        let err = DownloadTest::new(&client, &spec)
            .run(|_| {}, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.cause, ErrorCause::Network);
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/__down"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 1_000])
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let spec = spec_for(&server, 1);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut samples = 0;
        let err = DownloadTest::new(&client, &spec)
            .run(|_| samples += 1, &token)
            .await
            .unwrap_err();

        assert!(err.is_aborted());
        assert_eq!(samples, 0);
    }

    #[tokio::test]
    async fn test_cancel_between_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/__down"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1_000_000]))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let spec = spec_for(&server, 3);
        let token = CancellationToken::new();
        let trigger = token.clone();

        let mut samples = 0;
        let err = DownloadTest::new(&client, &spec)
            .run(
                |_| {
                    samples += 1;
                    trigger.cancel();
                },
                &token,
            )
            .await
            .unwrap_err();

        assert!(err.is_aborted());
        assert_eq!(samples, 1, "the next chunk read must observe the cancel");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
