use std::fmt;

use thiserror::Error;

use super::Phase;

/// Failure taxonomy shared by every sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCause {
    /// Transport failure or a non-success HTTP status.
    Network,
    /// The run was cancelled while this phase was in flight.
    Aborted,
    /// The response lacked something the sampler needs, e.g. a readable body.
    Protocol,
}

impl ErrorCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Aborted => "aborted",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a single sampler. The runner tags it with a phase.
#[derive(Debug, Clone, Error)]
#[error("{cause}: {message}")]
pub struct SampleError {
    pub cause: ErrorCause,
    pub message: String,
}

impl SampleError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            cause: ErrorCause::Network,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            cause: ErrorCause::Protocol,
            message: message.into(),
        }
    }

    pub fn aborted() -> Self {
        Self {
            cause: ErrorCause::Aborted,
            message: "cancelled".to_string(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.cause == ErrorCause::Aborted
    }

    pub fn with_phase(self, phase: Phase) -> RunError {
        RunError {
            phase,
            cause: self.cause,
            message: self.message,
        }
    }
}

impl From<reqwest::Error> for SampleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_body() || e.is_decode() {
            Self::protocol(e.to_string())
        } else {
            Self::network(e.to_string())
        }
    }
}

/// A failed run, as surfaced to whoever drives the [`TestRunner`](super::runner::TestRunner).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{phase} failed ({cause}): {message}")]
pub struct RunError {
    pub phase: Phase,
    pub cause: ErrorCause,
    pub message: String,
}
