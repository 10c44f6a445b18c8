//! Configuration for the ConnectLife bridge

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

fn default_base_url() -> Url {
    Url::parse("https://api.connectlife.io/").expect("static URL")
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_dictionary_dir() -> PathBuf {
    PathBuf::from("dictionaries")
}

/// Cloud endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub username: String,
    pub password: String,

    /// Production endpoint by default; overridable for test servers.
    #[serde(default = "default_base_url")]
    pub base_url: Url,

    /// Per-request timeout; must stay below the poll interval.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl CloudConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Polling and dictionary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Directory holding per-model-key dictionary schema files.
    #[serde(default = "default_dictionary_dir")]
    pub dictionary_dir: PathBuf,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            dictionary_dir: default_dictionary_dir(),
        }
    }
}

impl PollingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Per-device user preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceOptions {
    /// Suppress the confirmation beep on every write to this appliance.
    #[serde(default)]
    pub disable_beep: bool,
}

/// Top-level bridge configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub cloud: CloudConfig,

    #[serde(default)]
    pub bridge: PollingConfig,

    /// Keyed by device identifier.
    #[serde(default)]
    pub devices: HashMap<String, DeviceOptions>,
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            BridgeError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: BridgeConfig = toml::from_str(&raw)
            .map_err(|e| BridgeError::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cloud.username.is_empty() {
            return Err(BridgeError::config("cloud.username must not be empty"));
        }
        if self.bridge.poll_interval_secs <= self.cloud.request_timeout_secs {
            return Err(BridgeError::config(format!(
                "poll interval ({}s) must exceed request timeout ({}s)",
                self.bridge.poll_interval_secs, self.cloud.request_timeout_secs
            )));
        }
        Ok(())
    }

    /// Options for one device, falling back to defaults.
    pub fn device_options(&self, device_id: &str) -> DeviceOptions {
        self.devices.get(device_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> BridgeConfig {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [cloud]
            username = "user@example.com"
            password = "secret"
            "#,
        );
        config.validate().unwrap();
        assert_eq!(config.bridge.poll_interval_secs, 60);
        assert_eq!(config.cloud.request_timeout_secs, 10);
        assert!(!config.device_options("any").disable_beep);
    }

    #[test]
    fn per_device_options() {
        let config = parse(
            r#"
            [cloud]
            username = "user@example.com"
            password = "secret"

            [devices."abc-123"]
            disable_beep = true
            "#,
        );
        assert!(config.device_options("abc-123").disable_beep);
        assert!(!config.device_options("other").disable_beep);
    }

    #[test]
    fn poll_interval_must_exceed_timeout() {
        let config = parse(
            r#"
            [cloud]
            username = "user@example.com"
            password = "secret"
            request_timeout_secs = 60

            [bridge]
            poll_interval_secs = 30
            "#,
        );
        assert!(config.validate().is_err());
    }
}
