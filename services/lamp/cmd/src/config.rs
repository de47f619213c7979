//! Configuration handling for the lamp binary.
//!
//! Values come from three layers, later ones winning: the YAML config file,
//! `FLUVAL_*` environment variables, and command-line flags (applied in
//! `main`).

use anyhow::Result;
use lamp_session::{normalize_address, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// BLE backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory simulated lamp
    Mock,
    /// Platform Bluetooth stack
    Btleplug,
}

/// Lamp service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LampConfig {
    /// Device addresses to manage
    pub devices: Vec<String>,
    /// Which transport to use
    pub backend: Backend,
    /// Session timings
    pub session: SessionSettings,
}

/// Session timings in whole seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub heartbeat_interval_secs: u64,
    pub command_ttl_secs: u64,
    pub active_time_secs: u64,
    pub reconnect_cooldown_secs: u64,
    pub operation_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            heartbeat_interval_secs: defaults.heartbeat_interval.as_secs(),
            command_ttl_secs: defaults.command_ttl.as_secs(),
            active_time_secs: defaults.active_time.as_secs(),
            reconnect_cooldown_secs: defaults.reconnect_cooldown.as_secs(),
            operation_timeout_secs: defaults.operation_timeout.as_secs(),
        }
    }
}

impl Default for LampConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            backend: Backend::Mock,
            session: SessionSettings::default(),
        }
    }
}

/// Root of the YAML file
#[derive(Debug, Deserialize)]
struct RootConfig {
    lamp: Option<LampConfig>,
}

impl LampConfig {
    /// Load configuration from file and environment variables.
    ///
    /// A missing or unparsable file falls back to defaults.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    info!("Loaded configuration from {:?}", path);
                    root.lamp.unwrap_or_default()
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?} ({}), using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.devices = config.devices.iter().map(|d| normalize_address(d)).collect();

        info!(
            "Lamp configuration: backend={:?}, devices={:?}, heartbeat={}s, command_ttl={}s, cooldown={}s",
            config.backend,
            config.devices,
            config.session.heartbeat_interval_secs,
            config.session.command_ttl_secs,
            config.session.reconnect_cooldown_secs
        );
        Ok(config)
    }

    /// Apply `FLUVAL_*` overrides read through `lookup`
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(devices) = lookup("FLUVAL_DEVICES") {
            self.devices = devices
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
            info!("Devices overridden by environment: {:?}", self.devices);
        }

        let seconds = |key: &str| -> Option<u64> {
            let value = lookup(key)?;
            match value.trim().parse() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    warn!("Ignoring {}={:?}: not a number of seconds", key, value);
                    None
                }
            }
        };
        if let Some(secs) = seconds("FLUVAL_HEARTBEAT_SECS") {
            self.session.heartbeat_interval_secs = secs;
            info!("Heartbeat interval overridden by environment: {}s", secs);
        }
        if let Some(secs) = seconds("FLUVAL_COMMAND_TTL_SECS") {
            self.session.command_ttl_secs = secs;
            info!("Command TTL overridden by environment: {}s", secs);
        }
        if let Some(secs) = seconds("FLUVAL_COOLDOWN_SECS") {
            self.session.reconnect_cooldown_secs = secs;
            info!("Reconnect cooldown overridden by environment: {}s", secs);
        }
    }

    /// Session timings as a [`SessionConfig`]
    pub fn session_config(&self) -> SessionConfig {
        let s = &self.session;
        SessionConfig {
            heartbeat_interval: Duration::from_secs(s.heartbeat_interval_secs),
            command_ttl: Duration::from_secs(s.command_ttl_secs),
            active_time: Duration::from_secs(s.active_time_secs),
            reconnect_cooldown: Duration::from_secs(s.reconnect_cooldown_secs),
            operation_timeout: Duration::from_secs(s.operation_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = LampConfig::default();
        assert!(config.devices.is_empty());
        assert_eq!(config.backend, Backend::Mock);
        let session = config.session_config();
        assert_eq!(session.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(session.command_ttl, Duration::from_secs(15));
        assert_eq!(session.active_time, Duration::from_secs(120));
        assert_eq!(session.reconnect_cooldown, Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
lamp:
  backend: btleplug
  devices:
    - aa:bb:cc:dd:ee:ff
  session:
    heartbeat_interval_secs: 5
    command_ttl_secs: 30
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = LampConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.backend, Backend::Btleplug);
        assert_eq!(config.devices, vec!["AA:BB:CC:DD:EE:FF"]);
        assert_eq!(config.session.heartbeat_interval_secs, 5);
        assert_eq!(config.session.command_ttl_secs, 30);
        assert_eq!(config.session.reconnect_cooldown_secs, 1);
    }

    #[test]
    fn test_unparsable_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"lamp: [not, a, map").unwrap();

        let config = LampConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.backend, Backend::Mock);
        assert_eq!(config.session, SessionSettings::default());
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("FLUVAL_DEVICES", "11:22:33:44:55:66, 77:88:99:AA:BB:CC,"),
            ("FLUVAL_HEARTBEAT_SECS", "3"),
            ("FLUVAL_COOLDOWN_SECS", "soon"),
        ]
        .into_iter()
        .collect();

        let mut config = LampConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.devices, vec!["11:22:33:44:55:66", "77:88:99:AA:BB:CC"]);
        assert_eq!(config.session.heartbeat_interval_secs, 3);
        assert_eq!(config.session.reconnect_cooldown_secs, 1);
        assert_eq!(config.session.command_ttl_secs, 15);
    }
}
