//! Poller configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! { "poll_interval_us": 20000, "mouse_ports": [0, 1], "lightpen": false }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{InputError, InputResult};
use crate::mouse::{MousePort, MAX_MOUSE_DELTA};
use crate::registers::Chipset;

/// 60 Hz.
pub const DEFAULT_POLL_INTERVAL_US: u64 = 16_670;
pub const DEFAULT_IDLE_SLEEP_US: u64 = 500;
pub const DEFAULT_SETTLE_US: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollerConfig {
    /// Tick cadence.
    pub poll_interval_us: u64,
    /// Sleep between cadence checks while waiting for the next tick.
    pub idle_sleep_us: u64,
    /// Delay between selecting a keyboard column and reading its rows.
    pub settle_us: u64,
    pub chipset: Chipset,
    pub mouse_ports: Vec<MousePort>,
    /// Largest relative motion reported per axis per tick.
    pub max_mouse_delta: i32,
    pub keyboard: bool,
    pub mouse: bool,
    pub lightpen: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
            idle_sleep_us: DEFAULT_IDLE_SLEEP_US,
            settle_us: DEFAULT_SETTLE_US,
            chipset: Chipset::default(),
            mouse_ports: vec![MousePort::Port0],
            max_mouse_delta: MAX_MOUSE_DELTA,
            keyboard: true,
            mouse: true,
            lightpen: true,
        }
    }
}

impl PollerConfig {
    pub fn from_json_str(json: &str) -> InputResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| InputError::Config(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> InputResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| InputError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> InputResult<()> {
        if self.poll_interval_us == 0 {
            return Err(InputError::Config(
                "poll_interval_us must be greater than zero".to_string(),
            ));
        }

        if self.max_mouse_delta <= 0 {
            return Err(InputError::Config(
                "max_mouse_delta must be greater than zero".to_string(),
            ));
        }

        for (i, port) in self.mouse_ports.iter().enumerate() {
            if self.mouse_ports[..i].contains(port) {
                return Err(InputError::Config(format!(
                    "mouse port {} listed more than once",
                    port.index()
                )));
            }
        }

        if !(self.keyboard || self.mouse || self.lightpen) {
            return Err(InputError::Config("every device is disabled".to_string()));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.idle_sleep_us)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_micros(self.settle_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = PollerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PollerConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_micros(16_670));
        assert_eq!(config.mouse_ports, vec![MousePort::Port0]);
    }

    #[test]
    fn fields_override_defaults() {
        let config = PollerConfig::from_json_str(
            r#"{ "poll_interval_us": 20000, "chipset": "aga", "mouse_ports": [0, 1], "lightpen": false }"#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_us, 20_000);
        assert_eq!(config.chipset, Chipset::Aga);
        assert_eq!(config.mouse_ports, vec![MousePort::Port0, MousePort::Port1]);
        assert!(!config.lightpen);
        assert!(config.keyboard);
    }

    #[test]
    fn rejects_bad_values() {
        for json in [
            r#"{ "poll_interval_us": 0 }"#,
            r#"{ "max_mouse_delta": 0 }"#,
            r#"{ "mouse_ports": [1, 1] }"#,
            r#"{ "mouse_ports": [2] }"#,
            r#"{ "keyboard": false, "mouse": false, "lightpen": false }"#,
            r#"{ "pollinterval": 5 }"#,
        ] {
            assert!(
                matches!(PollerConfig::from_json_str(json), Err(InputError::Config(_))),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = PollerConfig::load("/nonexistent/amiga-input.json").unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
