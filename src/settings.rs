use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::speedtest::resolver::NominalSize;

const DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down";
const UPLOAD_URL: &str = "https://speed.cloudflare.com/__up";
const LATENCY_URL: &str = "https://speed.cloudflare.com/__down?bytes=0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine tuning and endpoints. Every field may be omitted from the TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub download_url: Url,
    pub upload_url: Url,
    pub latency_url: Url,
    /// Upload payloads never exceed this many megabytes.
    pub upload_cap_mb: u32,
    pub ping_count: usize,
    pub ping_interval_ms: u64,
    /// How often the in-flight upload placeholder is refreshed.
    pub upload_tick_ms: u64,
    pub connect_timeout_secs: u64,
    pub default_size: NominalSize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_url: builtin_url(DOWNLOAD_URL),
            upload_url: builtin_url(UPLOAD_URL),
            latency_url: builtin_url(LATENCY_URL),
            upload_cap_mb: 25,
            ping_count: 5,
            ping_interval_ms: 100,
            upload_tick_ms: 100,
            connect_timeout_secs: 10,
            default_size: NominalSize::default(),
        }
    }
}

fn builtin_url(s: &str) -> Url {
    Url::parse(s).expect("built-in endpoint URL is valid")
}

impl Settings {
    /// Read settings from a TOML file, falling back to defaults for missing keys.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_count == 0 {
            return Err(ConfigError::Invalid("ping_count must be at least 1".into()));
        }
        if self.upload_cap_mb == 0 {
            return Err(ConfigError::Invalid("upload_cap_mb must be at least 1".into()));
        }
        if self.upload_tick_ms == 0 {
            return Err(ConfigError::Invalid("upload_tick_ms must be at least 1".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("connect_timeout_secs must be at least 1".into()));
        }
        for url in [&self.download_url, &self.upload_url, &self.latency_url] {
            match url.scheme() {
                "http" | "https" => {}
                scheme => {
                    return Err(ConfigError::Invalid(format!(
                        "unsupported scheme {scheme:?} in {url}"
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn upload_tick(&self) -> Duration {
        Duration::from_millis(self.upload_tick_ms)
    }

    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .build()
    }
}
