use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Largest payload the download endpoint serves in one response.
pub const MAX_RESOURCE_MB: u32 = 100;
pub const BYTES_PER_MB: u64 = 1_000_000;

const CACHE_BUST_PARAM: &str = "nocache";

/// Transfer sizes a user can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(try_from = "u32")]
pub enum NominalSize {
    Mb1,
    Mb5,
    Mb10,
    #[default]
    Mb50,
    Mb100,
    Mb500,
    Mb1000,
}

impl NominalSize {
    pub const ALL: [NominalSize; 7] = [
        NominalSize::Mb1,
        NominalSize::Mb5,
        NominalSize::Mb10,
        NominalSize::Mb50,
        NominalSize::Mb100,
        NominalSize::Mb500,
        NominalSize::Mb1000,
    ];

    pub fn megabytes(self) -> u32 {
        match self {
            Self::Mb1 => 1,
            Self::Mb5 => 5,
            Self::Mb10 => 10,
            Self::Mb50 => 50,
            Self::Mb100 => 100,
            Self::Mb500 => 500,
            Self::Mb1000 => 1000,
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// Next larger size, saturating at the largest.
    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1).min(Self::ALL.len() - 1)]
    }

    /// Next smaller size, saturating at the smallest.
    pub fn prev(self) -> Self {
        Self::ALL[self.index().saturating_sub(1)]
    }
}

impl fmt::Display for NominalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MB", self.megabytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported transfer size {0:?}, expected one of 1, 5, 10, 50, 100, 500, 1000 (MB)")]
pub struct SizeParseError(pub String);

impl TryFrom<u32> for NominalSize {
    type Error = SizeParseError;

    fn try_from(mb: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|s| s.megabytes() == mb)
            .ok_or_else(|| SizeParseError(mb.to_string()))
    }
}

impl FromStr for NominalSize {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_suffix("MB")
            .or_else(|| trimmed.strip_suffix("mb"))
            .unwrap_or(trimmed)
            .trim();
        let mb: u32 = digits.parse().map_err(|_| SizeParseError(s.to_string()))?;
        Self::try_from(mb).map_err(|_| SizeParseError(s.to_string()))
    }
}

/// A concrete transfer derived from a [`NominalSize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSpec {
    pub resource: Url,
    pub repetitions: u32,
    pub nominal_mb: u32,
    /// Bytes moved by a single repetition.
    pub resource_bytes: u64,
}

impl TransferSpec {
    pub fn total_bytes(&self) -> u64 {
        self.resource_bytes * self.repetitions as u64
    }
}

/// Map a nominal size onto the download endpoint.
///
/// Sizes up to [`MAX_RESOURCE_MB`] are served in one response. Larger sizes
/// fetch the largest resource back to back, as few times as still covers
/// the requested size.
pub fn resolve_download(download_url: &Url, size: NominalSize) -> TransferSpec {
    let nominal_mb = size.megabytes();
    let resource_mb = nominal_mb.min(MAX_RESOURCE_MB);
    let resource_bytes = resource_mb as u64 * BYTES_PER_MB;

    let mut resource = download_url.clone();
    resource
        .query_pairs_mut()
        .append_pair("bytes", &resource_bytes.to_string());

    TransferSpec {
        resource,
        repetitions: nominal_mb.div_ceil(resource_mb),
        nominal_mb,
        resource_bytes,
    }
}

/// Map a nominal size onto the upload endpoint, capped at `cap_mb`.
pub fn resolve_upload(upload_url: &Url, size: NominalSize, cap_mb: u32) -> TransferSpec {
    let nominal_mb = size.megabytes();
    TransferSpec {
        resource: upload_url.clone(),
        repetitions: 1,
        nominal_mb,
        resource_bytes: nominal_mb.min(cap_mb.max(1)) as u64 * BYTES_PER_MB,
    }
}

/// Copy of `url` with a fresh random query parameter so no cache can answer.
pub fn cache_busted(url: &Url) -> Url {
    let mut busted = url.clone();
    busted
        .query_pairs_mut()
        .append_pair(CACHE_BUST_PARAM, &format!("{:016x}", rand::random::<u64>()));
    busted
}
