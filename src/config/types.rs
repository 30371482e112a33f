use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::levels::{FINE_STEPS, STANDARD_STEPS};
use crate::audio::policy::DEFAULT_UNMUTE_FALLBACK;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub volume: VolumeConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub permissions: PermissionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub json_logs: bool,
    pub log_to_file: bool,
}

/// Key stepping behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Steps across the full range for a plain key press
    pub coarse_steps: u32,
    /// Steps across the full range with Shift+Option held
    pub fine_steps: u32,
    /// Volume restored on unmute when nothing audible was ever seen
    pub unmute_fallback: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub debounce_ms: u64,
    pub watch_device_liveness: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub prompt_on_start: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            log_to_file: true,
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            coarse_steps: STANDARD_STEPS,
            fine_steps: FINE_STEPS,
            unmute_fallback: DEFAULT_UNMUTE_FALLBACK,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            watch_device_liveness: true,
        }
    }
}

impl MonitorConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            poll_max_attempts: 120,
            prompt_on_start: true,
        }
    }
}

impl PermissionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Reject values that would make stepping or debouncing meaningless
    pub fn validate(&self) -> Result<()> {
        if self.volume.coarse_steps == 0 {
            bail!("volume.coarse_steps must be greater than zero");
        }
        if self.volume.fine_steps == 0 {
            bail!("volume.fine_steps must be greater than zero");
        }
        let fallback = self.volume.unmute_fallback;
        if !(fallback > 0.0 && fallback <= 1.0) {
            bail!(
                "volume.unmute_fallback must be in (0, 1], got {}",
                fallback
            );
        }
        if self.monitor.debounce_ms == 0 {
            bail!("monitor.debounce_ms must be greater than zero");
        }
        if self.permissions.poll_interval_ms == 0 {
            bail!("permissions.poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.volume.coarse_steps, 16);
        assert_eq!(config.volume.fine_steps, 64);
        assert_eq!(config.monitor.debounce_window(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_sections_fill_in_defaults() {
        let config: Config = toml::from_str(
            r#"
[volume]
unmute_fallback = 0.5

[monitor]
watch_device_liveness = false
"#,
        )
        .unwrap();

        assert_eq!(config.volume.unmute_fallback, 0.5);
        assert_eq!(config.volume.coarse_steps, 16);
        assert!(!config.monitor.watch_device_liveness);
        assert_eq!(config.monitor.debounce_ms, 50);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.volume.coarse_steps = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.volume.unmute_fallback = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.volume.unmute_fallback = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.debounce_ms = 0;
        assert!(config.validate().is_err());
    }
}
