//! Configuration Management
//!
//! Provider settings come from a JSON file under the user's config
//! directory, with credentials and region overridable from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Region used when neither the file nor the environment names one
pub const DEFAULT_REGION: &str = "cn-beijing";

/// Per-service endpoint overrides (for private endpoints, proxies and tests)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Endpoints {
    #[serde(default)]
    pub ecs: Option<String>,
    #[serde(default)]
    pub slb: Option<String>,
    /// Log service base URL. May contain `{project}`.
    #[serde(default)]
    pub log: Option<String>,
    /// Function Compute base URL
    #[serde(default)]
    pub fc: Option<String>,
}

/// Wait and retry budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_wait_secs")]
    pub default_wait_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Retry budget for deletes and for creates waiting on RAM role propagation
    #[serde(default = "default_delete_secs")]
    pub delete_secs: u64,
    #[serde(default = "default_log_retry_secs")]
    pub log_retry_secs: u64,
    #[serde(default = "default_log_delete_secs")]
    pub log_delete_secs: u64,
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,
}

fn default_wait_secs() -> u64 {
    120
}
fn default_poll_interval_ms() -> u64 {
    5_000
}
fn default_delete_secs() -> u64 {
    300
}
fn default_log_retry_secs() -> u64 {
    120
}
fn default_log_delete_secs() -> u64 {
    180
}
fn default_request_secs() -> u64 {
    30
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_wait_secs: default_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            delete_secs: default_delete_secs(),
            log_retry_secs: default_log_retry_secs(),
            log_delete_secs: default_log_delete_secs(),
            request_secs: default_request_secs(),
        }
    }
}

impl Timeouts {
    pub fn default_wait(&self) -> Duration {
        Duration::from_secs(self.default_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }

    pub fn log_retry(&self) -> Duration {
        Duration::from_secs(self.log_retry_secs)
    }

    pub fn log_delete(&self) -> Duration {
        Duration::from_secs(self.log_delete_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// STS token for temporary credentials
    #[serde(default)]
    pub security_token: Option<String>,
    /// Account id, required by Function Compute
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl ProviderConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("alicloud-provider").join("config.json"))
    }

    /// Load configuration from the default location, then apply env overrides.
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Environment variables win over file values
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`; unset and empty values are ignored
    fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = env("ALICLOUD_ACCESS_KEY") {
            self.access_key = Some(v);
        }
        if let Some(v) = env("ALICLOUD_SECRET_KEY") {
            self.secret_key = Some(v);
        }
        if let Some(v) = env("ALICLOUD_SECURITY_TOKEN") {
            self.security_token = Some(v);
        }
        if let Some(v) = env("ALICLOUD_REGION") {
            self.region = Some(v);
        }
        if let Some(v) = env("ALICLOUD_ACCOUNT_ID") {
            self.account_id = Some(v);
        }
    }

    /// Get effective region (config > default)
    pub fn effective_region(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }
}
