use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::download::DownloadTest;
use super::error::SampleError;
use super::resolver::TransferSpec;
use super::upload::UploadTest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    /// `tick` paces the placeholder estimate published while the POST is in flight.
    Upload { tick: Duration },
}

/// Cumulative-average throughput in megabits per second.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}

/// Run one transfer in `direction`, feeding running estimates to `on_sample`.
///
/// Returns the final cumulative-average throughput in Mbps.
pub async fn measure_transfer<F>(
    client: &reqwest::Client,
    direction: Direction,
    spec: &TransferSpec,
    on_sample: F,
    token: &CancellationToken,
) -> Result<f64, SampleError>
where
    F: FnMut(f64),
{
    let result = match direction {
        Direction::Download => {
            DownloadTest::new(client, spec)
                .run(on_sample, token)
                .await?
                .avg_speed_mbps
        }
        Direction::Upload { tick } => {
            UploadTest::new(client, spec, tick)
                .run(on_sample, token)
                .await?
                .avg_speed_mbps
        }
    };
    Ok(result)
}
