use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const MIN_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub polling: PollingSettings,
    pub session_path: Option<PathBuf>,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub endpoint: String,
    pub request_timeout_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://placeholder-api-id.execute-api.us-east-1.amazonaws.com/dev"
                .to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: u64,
    pub backoff: bool,
    pub max_interval_ms: u64,
    pub results_interval_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            backoff: true,
            max_interval_ms: 30_000,
            results_interval_ms: 5_000,
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn results_interval(&self) -> Duration {
        Duration::from_millis(self.results_interval_ms)
    }
}

impl Settings {
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gallery-watch"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config directory")?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let polling = &self.polling;
        if polling.interval_ms < MIN_INTERVAL_MS {
            anyhow::bail!(
                "polling.interval_ms must be at least {MIN_INTERVAL_MS}, got {}",
                polling.interval_ms
            );
        }
        if polling.results_interval_ms < MIN_INTERVAL_MS {
            anyhow::bail!(
                "polling.results_interval_ms must be at least {MIN_INTERVAL_MS}, got {}",
                polling.results_interval_ms
            );
        }
        if polling.max_interval_ms < polling.interval_ms {
            anyhow::bail!(
                "polling.max_interval_ms ({}) must not be below polling.interval_ms ({})",
                polling.max_interval_ms,
                polling.interval_ms
            );
        }
        if self.api.request_timeout_ms < MIN_INTERVAL_MS {
            anyhow::bail!(
                "api.request_timeout_ms must be at least {MIN_INTERVAL_MS}, got {}",
                self.api.request_timeout_ms
            );
        }

        let url = reqwest::Url::parse(&self.api.endpoint)
            .with_context(|| format!("api.endpoint is not a valid URL: {}", self.api.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("api.endpoint must use http or https, got {}", url.scheme());
        }
        Ok(())
    }

    pub fn session_path(&self) -> Option<PathBuf> {
        self.session_path
            .clone()
            .or_else(|| Self::config_dir().map(|p| p.join("session.json")))
    }
}
