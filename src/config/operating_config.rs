//! Operating configuration loaded with Figment
//!
//! Configuration is layered from (lowest to highest precedence):
//! 1. Built-in defaults
//! 2. A TOML file (default `config/gimbal.toml`)
//! 3. Environment variables prefixed with `GIMBAL_`
//!
//! ```text
//! GIMBAL_GIMBAL_MODE=2
//! GIMBAL_STATE_POLL_RATE=50.0
//! GIMBAL_PAN_AXIS_STABILIZE=false
//! ```
//!
//! Mode codes are kept as raw integers here. They are only translated (and
//! rejected if out of range) when startup turns them into vendor commands.

use crate::error::{GimbalError, GimbalResult};
use crate::gimbal::{AxisInputMode, AxisMode, GimbalMode};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/gimbal.toml";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "GIMBAL_";

/// Live operating parameters of the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatingConfig {
    /// Serial device path. Only read when the session is constructed.
    pub device: String,
    /// Serial baud rate. Only read when the session is constructed.
    pub baudrate: u32,
    /// 0 = OFF, 1 = LOCK, 2 = FOLLOW
    pub gimbal_mode: i32,
    /// 0 = body frame angle, 1 = angular rate, 2 = absolute frame angle
    pub tilt_axis_input_mode: i32,
    /// Stabilize the tilt axis
    pub tilt_axis_stabilize: bool,
    /// Roll axis input mode code
    pub roll_axis_input_mode: i32,
    /// Stabilize the roll axis
    pub roll_axis_stabilize: bool,
    /// Pan axis input mode code
    pub pan_axis_input_mode: i32,
    /// Stabilize the pan axis
    pub pan_axis_stabilize: bool,
    /// Telemetry poll rate in Hz
    pub state_poll_rate: f64,
    /// Pause after the session starts, before the first status query
    pub settle_delay_ms: u64,
    /// Status poll interval while waiting for power-on
    pub power_on_poll_interval_ms: u64,
    /// Topic name for inertial telemetry
    pub imu_topic: String,
    /// Topic name for mount pointing telemetry
    pub encoder_topic: String,
    /// Capacity of each telemetry broadcast channel
    pub publish_queue_size: usize,
}

impl Default for OperatingConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baudrate: 115200,
            gimbal_mode: 1,
            tilt_axis_input_mode: 0,
            tilt_axis_stabilize: true,
            roll_axis_input_mode: 0,
            roll_axis_stabilize: true,
            pan_axis_input_mode: 0,
            pan_axis_stabilize: true,
            state_poll_rate: 10.0,
            settle_delay_ms: 1000,
            power_on_poll_interval_ms: 50,
            imu_topic: "/gimbal/imu/data".to_string(),
            encoder_topic: "/gimbal/encoder".to_string(),
            publish_queue_size: 10,
        }
    }
}

impl OperatingConfig {
    /// Load from `config/gimbal.toml` and `GIMBAL_` environment variables
    pub fn load() -> GimbalResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply. The result is validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> GimbalResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults, without env overrides
    pub fn from_toml_str(toml: &str) -> GimbalResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> GimbalResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GimbalError::Configuration(format!("Failed to serialize config: {}", e)))
    }

    /// Validate values that would make the node unusable
    ///
    /// Mode codes are not checked here; startup rejects them on translation.
    pub fn validate(&self) -> GimbalResult<()> {
        if self.device.is_empty() {
            return Err(GimbalError::Configuration(
                "'device' cannot be empty".to_string(),
            ));
        }

        if self.baudrate == 0 {
            return Err(GimbalError::Configuration(
                "'baudrate' must be > 0".to_string(),
            ));
        }

        self.poll_period()?;

        if self.power_on_poll_interval_ms == 0 {
            return Err(GimbalError::Configuration(
                "'power_on_poll_interval_ms' must be > 0".to_string(),
            ));
        }

        if self.publish_queue_size == 0 {
            return Err(GimbalError::Configuration(
                "'publish_queue_size' must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Telemetry timer period derived from `state_poll_rate`
    pub fn poll_period(&self) -> GimbalResult<Duration> {
        if !self.state_poll_rate.is_finite() || self.state_poll_rate <= 0.0 {
            return Err(GimbalError::Configuration(format!(
                "Invalid state_poll_rate {}. Must be a positive number of Hz",
                self.state_poll_rate
            )));
        }
        match Duration::try_from_secs_f64(1.0 / self.state_poll_rate) {
            Ok(period) if !period.is_zero() => Ok(period),
            _ => Err(GimbalError::Configuration(format!(
                "Invalid state_poll_rate {}. Period must be between 1ns and Duration::MAX",
                self.state_poll_rate
            ))),
        }
    }

    /// Pause before the first status query
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Status poll interval while waiting for power-on
    pub fn power_on_poll_interval(&self) -> Duration {
        Duration::from_millis(self.power_on_poll_interval_ms)
    }

    /// Translate `gimbal_mode` into the vendor enum
    pub fn gimbal_mode(&self) -> GimbalResult<GimbalMode> {
        GimbalMode::try_from(self.gimbal_mode)
    }

    /// Build the (tilt, roll, pan) axis modes
    pub fn axis_modes(&self) -> GimbalResult<(AxisMode, AxisMode, AxisMode)> {
        let tilt = AxisMode {
            input_mode: AxisInputMode::try_from(self.tilt_axis_input_mode)?,
            stabilize: self.tilt_axis_stabilize,
        };
        let roll = AxisMode {
            input_mode: AxisInputMode::try_from(self.roll_axis_input_mode)?,
            stabilize: self.roll_axis_stabilize,
        };
        let pan = AxisMode {
            input_mode: AxisInputMode::try_from(self.pan_axis_input_mode)?,
            stabilize: self.pan_axis_stabilize,
        };
        Ok((tilt, roll, pan))
    }
}
