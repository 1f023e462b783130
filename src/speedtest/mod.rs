pub mod cancel;
pub mod download;
pub mod error;
pub mod ping;
pub mod resolver;
pub mod runner;
pub mod transfer;
pub mod upload;

use std::fmt;

use error::RunError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedTestResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub jitter_ms: f64,
}

impl SpeedTestResult {
    pub fn record(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::Download => self.download_mbps = value,
            Metric::Upload => self.upload_mbps = value,
            Metric::Ping => self.ping_ms = value,
        }
    }
}

// ─── Run Status Machine ─────────────────────────────
//
//  idle → measuring-download → measuring-upload → measuring-latency → finished
//              │                      │                   │
//              ├→ failed ←────────────┴───────────────────┤
//              └→ idle (aborted) ←────┴───────────────────┘
//
//  idle | finished | failed → measuring-download (start)

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    MeasuringDownload,
    MeasuringUpload,
    MeasuringLatency,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn is_measuring(self) -> bool {
        matches!(
            self,
            Self::MeasuringDownload | Self::MeasuringUpload | Self::MeasuringLatency
        )
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Idle | Finished | Failed, MeasuringDownload) => true,
            (MeasuringDownload, MeasuringUpload) => true,
            (MeasuringUpload, MeasuringLatency) => true,
            (MeasuringLatency, Finished) => true,
            (from, Failed | Idle) => from.is_measuring(),
            _ => false,
        }
    }

    /// Phase being measured, if any.
    pub fn phase(self) -> Option<Phase> {
        match self {
            Self::MeasuringDownload => Some(Phase::Download),
            Self::MeasuringUpload => Some(Phase::Upload),
            Self::MeasuringLatency => Some(Phase::Latency),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::MeasuringDownload => "measuring-download",
            Self::MeasuringUpload => "measuring-upload",
            Self::MeasuringLatency => "measuring-latency",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Download,
    Upload,
    Latency,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
            Self::Latency => "latency",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Download,
    Upload,
    Ping,
}

/// Everything a [`runner::TestRunner`] publishes to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum TestUpdate {
    Status(RunStatus),
    /// Latest estimate for a metric. Replaces any earlier value.
    Sample(Metric, f64),
    /// Latency finished; carries the spread of the successful probes.
    Jitter(f64),
    Failed(RunError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunStatus::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Idle.can_transition_to(MeasuringDownload));
        assert!(MeasuringDownload.can_transition_to(MeasuringUpload));
        assert!(MeasuringUpload.can_transition_to(MeasuringLatency));
        assert!(MeasuringLatency.can_transition_to(Finished));
        assert!(Finished.can_transition_to(MeasuringDownload));
        assert!(Failed.can_transition_to(MeasuringDownload));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!Idle.can_transition_to(MeasuringUpload));
        assert!(!MeasuringDownload.can_transition_to(MeasuringLatency));
        assert!(!MeasuringUpload.can_transition_to(MeasuringDownload));
        assert!(!MeasuringDownload.can_transition_to(Finished));
        assert!(!Idle.can_transition_to(Failed));
        assert!(!Finished.can_transition_to(Idle));
        assert!(!MeasuringUpload.can_transition_to(MeasuringUpload));
    }

    #[test]
    fn test_abort_and_failure_from_any_measuring_state() {
        for s in [MeasuringDownload, MeasuringUpload, MeasuringLatency] {
            assert!(s.can_transition_to(Idle));
            assert!(s.can_transition_to(Failed));
        }
    }
}
