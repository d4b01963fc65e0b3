use crate::bridge::BridgeSettings;
use crate::error::{BridgeError, Result};
use crate::protocol::HardwareProfile;
use crate::ramp::RampSettings;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file
///
/// Every section and field is optional; a missing file yields the defaults.
///
/// ```toml
/// [serial]
/// path = "/dev/ttyACM0"
/// baud_rate = 921600
///
/// [server]
/// listen = "0.0.0.0:1338"
///
/// [timing]
/// watchdog_ms = 2000
/// ramp_ceiling = 33
///
/// [profile]
/// channel_offset = 16
/// volume_transform = { kind = "attenuation", full_scale = 48 }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub server: ServerConfig,
    pub timing: TimingConfig,
    pub profile: HardwareProfile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyACM0".to_string(),
            baud_rate: 921_600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:1338".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub watchdog_ms: u64,
    pub heartbeat_ms: u64,
    pub step_interval_ms: u64,
    pub power_grace_ms: u64,
    pub ramp_margin: u32,
    pub ramp_ceiling: u8,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let bridge = BridgeSettings::default();
        Self {
            watchdog_ms: bridge.watchdog_window.as_millis() as u64,
            heartbeat_ms: bridge.heartbeat_interval.as_millis() as u64,
            step_interval_ms: bridge.ramp.step_interval.as_millis() as u64,
            power_grace_ms: bridge.ramp.power_grace.as_millis() as u64,
            ramp_margin: bridge.ramp.margin,
            ramp_ceiling: bridge.ramp.ceiling,
        }
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::info!("Loaded config from {}", path.display());
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.profile.validate().map_err(BridgeError::InvalidConfig)?;

        let t = &self.timing;
        if t.watchdog_ms == 0 || t.heartbeat_ms == 0 || t.step_interval_ms == 0 {
            return Err(BridgeError::InvalidConfig(
                "watchdog_ms, heartbeat_ms and step_interval_ms must be non-zero".to_string(),
            ));
        }
        if t.ramp_ceiling > self.profile.volume_mask {
            return Err(BridgeError::InvalidConfig(format!(
                "ramp_ceiling {} is above the largest reportable volume {}",
                t.ramp_ceiling, self.profile.volume_mask
            )));
        }
        Ok(())
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        let t = &self.timing;
        BridgeSettings {
            watchdog_window: Duration::from_millis(t.watchdog_ms),
            heartbeat_interval: Duration::from_millis(t.heartbeat_ms),
            ramp: RampSettings {
                step_interval: Duration::from_millis(t.step_interval_ms),
                power_grace: Duration::from_millis(t.power_grace_ms),
                margin: t.ramp_margin,
                ceiling: t.ramp_ceiling,
            },
        }
    }
}
