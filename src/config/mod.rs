//! Configuration system (layered: defaults < TOML file < environment).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::auth::{FileCredentialStore, PollPolicy};
use crate::error::TetherError;
use crate::relay::TOKEN_PLACEHOLDER;

/// Device configuration.
///
/// Every field has a default, so a partial file is valid. Environment
/// variables (after loading `.env`, if present) override the file.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
    pub scope: String,
    pub auth_code_url: String,
    pub auth_token_url: String,
    /// Relay URL with a `{token}` placeholder for the access token.
    pub relay_url_template: String,
    pub update_image_url: String,
    pub token_refresh_interval_min: u64,
    pub update_check_interval_min: u64,
    pub login_poll_attempts: u32,
    pub login_poll_interval_secs: u64,
    pub bus_capacity_bytes: usize,
    pub publish_timeout_ms: u64,
    pub consume_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub heartbeat_secs: u64,
    pub store_dir: Option<PathBuf>,
    pub hardware_id: Option<String>,
    pub network_interface: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            audience: "https://wiklosoft.eu.auth0.com/api/v2/".to_string(),
            scope: "name email profile openid offline_access".to_string(),
            auth_code_url: "https://wiklosoft.eu.auth0.com/oauth/device/code".to_string(),
            auth_token_url: "https://wiklosoft.eu.auth0.com/oauth/token".to_string(),
            relay_url_template: "wss://iot.wiklosoft.com/connect/device?token={token}".to_string(),
            update_image_url: "https://ota.wiklosoft.com/iot-rgb-led-driver-esp32.bin".to_string(),
            token_refresh_interval_min: 12 * 60,
            update_check_interval_min: 30,
            login_poll_attempts: 1000,
            login_poll_interval_secs: 10,
            bus_capacity_bytes: 1000,
            publish_timeout_ms: 100,
            consume_timeout_ms: 100,
            send_timeout_ms: 500,
            heartbeat_secs: 10,
            store_dir: None,
            hardware_id: None,
            network_interface: "eth0".to_string(),
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("audience", &self.audience)
            .field("auth_token_url", &self.auth_token_url)
            .field("relay_url_template", &self.relay_url_template)
            .field("token_refresh_interval_min", &self.token_refresh_interval_min)
            .field("update_check_interval_min", &self.update_check_interval_min)
            .field("store_dir", &self.store_dir)
            .finish_non_exhaustive()
    }
}

impl DeviceConfig {
    /// Load the file at `path` (when given), then apply the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, TetherError> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, TetherError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, TetherError> {
        toml::from_str(raw)
            .map_err(|err| TetherError::Configuration(format!("invalid config file: {err}")))
    }

    /// Overlay values from `lookup` (normally the process environment).
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), TetherError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strings: [(&str, &mut String); 8] = [
            ("TETHER_CLIENT_ID", &mut self.client_id),
            ("TETHER_CLIENT_SECRET", &mut self.client_secret),
            ("TETHER_AUDIENCE", &mut self.audience),
            ("TETHER_SCOPE", &mut self.scope),
            ("TETHER_AUTH_CODE_URL", &mut self.auth_code_url),
            ("TETHER_AUTH_TOKEN_URL", &mut self.auth_token_url),
            ("TETHER_RELAY_URL", &mut self.relay_url_template),
            ("TETHER_UPDATE_URL", &mut self.update_image_url),
        ];
        for (key, slot) in strings {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }

        let minutes: [(&str, &mut u64); 2] = [
            ("TETHER_REFRESH_INTERVAL_MIN", &mut self.token_refresh_interval_min),
            ("TETHER_UPDATE_INTERVAL_MIN", &mut self.update_check_interval_min),
        ];
        for (key, slot) in minutes {
            if let Some(value) = lookup(key) {
                *slot = value.trim().parse().map_err(|_| {
                    TetherError::Configuration(format!("{key} must be a whole number of minutes"))
                })?;
            }
        }

        if let Some(dir) = lookup("TETHER_STORE_DIR") {
            self.store_dir = Some(PathBuf::from(dir));
        }
        if let Some(id) = lookup("TETHER_HARDWARE_ID") {
            self.hardware_id = Some(id);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TetherError> {
        if !self.relay_url_template.contains(TOKEN_PLACEHOLDER) {
            return Err(TetherError::Configuration(format!(
                "relay_url_template must contain {TOKEN_PLACEHOLDER}"
            )));
        }
        let positive = [
            ("token_refresh_interval_min", self.token_refresh_interval_min),
            ("update_check_interval_min", self.update_check_interval_min),
            ("login_poll_attempts", u64::from(self.login_poll_attempts)),
            ("bus_capacity_bytes", self.bus_capacity_bytes as u64),
            ("heartbeat_secs", self.heartbeat_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(TetherError::Configuration(format!(
                "{name} must be greater than zero"
            )));
        }
        Ok(())
    }

    pub fn token_refresh_period(&self) -> Duration {
        Duration::from_secs(self.token_refresh_interval_min * 60)
    }

    pub fn update_check_period(&self) -> Duration {
        Duration::from_secs(self.update_check_interval_min * 60)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            max_attempts: self.login_poll_attempts,
            interval: Duration::from_secs(self.login_poll_interval_secs),
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn consume_timeout(&self) -> Duration {
        Duration::from_millis(self.consume_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(FileCredentialStore::default_dir)
    }
}
