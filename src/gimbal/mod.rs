//! Gimbal session interface
//!
//! Hardware-agnostic view of a vendor gimbal reachable over a serial link.
//! The protocol engine that frames and checksums messages lives outside this
//! crate; it plugs in by implementing [`GimbalSession`]. Everything the node
//! does to the hardware goes through this trait.
//!
//! ## Units
//! - Raw inertial samples are vendor units and are never rescaled here.
//! - Mount pointing values are whatever the vendor reports (degrees for the
//!   Gremsy family).
//! - Timestamps are device time in microseconds.

use crate::error::GimbalResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod mock;

/// Power/readiness state reported by the gimbal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GimbalState {
    /// Motors unpowered
    Off,
    /// Motors powering up, not yet holding position
    Init,
    /// Powered and ready for mode/axis configuration
    On,
    /// Vendor-reported fault
    Error,
    /// Any state code this crate does not name
    Other(u8),
}

impl GimbalState {
    /// Decode the vendor state byte.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => GimbalState::Off,
            1 => GimbalState::Init,
            2 => GimbalState::On,
            3 => GimbalState::Error,
            other => GimbalState::Other(other),
        }
    }

    /// Display name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            GimbalState::Off => "Off",
            GimbalState::Init => "Init",
            GimbalState::On => "On",
            GimbalState::Error => "Error",
            GimbalState::Other(_) => "Other",
        }
    }
}

/// Status snapshot fetched on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GimbalStatus {
    /// Reported power/readiness state
    pub state: GimbalState,
}

impl GimbalStatus {
    /// Status reporting `state`
    pub fn new(state: GimbalState) -> Self {
        Self { state }
    }
}

/// Motor power command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorPower {
    /// Energize the motors
    On,
    /// Release the motors
    Off,
}

/// Gimbal stabilization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GimbalMode {
    /// Motors hold no attitude
    Off,
    /// Camera holds its absolute heading
    Lock,
    /// Camera follows the vehicle heading
    Follow,
}

/// Frame in which an axis interprets pointing inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisInputMode {
    /// Angle relative to the vehicle body
    BodyFrameAngle,
    /// Angular rate
    AngularRate,
    /// Angle in the earth frame
    AbsoluteFrameAngle,
}

/// Per-axis control mode
///
/// Three of these (tilt, roll, pan) are always sent together in one
/// combined axis-configuration command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMode {
    /// Frame of pointing inputs
    pub input_mode: AxisInputMode,
    /// Whether the axis is stabilized
    pub stabilize: bool,
}

/// Raw IMU sample as reported by the gimbal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawInertialSample {
    /// Device timestamp (microseconds)
    pub time_usec: u64,
    /// X acceleration
    pub xacc: i16,
    /// Y acceleration
    pub yacc: i16,
    /// Z acceleration
    pub zacc: i16,
    /// X angular rate
    pub xgyro: i16,
    /// Y angular rate
    pub ygyro: i16,
    /// Z angular rate
    pub zgyro: i16,
}

/// Device timestamps of the most recent telemetry messages (microseconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GimbalTimestamps {
    /// Latest raw IMU sample
    pub raw_imu: u64,
    /// Latest mount orientation sample
    pub mount_orientation: u64,
}

/// Mechanical pointing of the mount, read from the encoders
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MountPointingSample {
    /// Pitch
    pub pitch: f32,
    /// Roll
    pub roll: f32,
    /// Yaw
    pub yaw: f32,
}

/// Operations the node needs from a connected gimbal
///
/// Implementations own the transport. Every call may fail with
/// [`GimbalError::Transport`](crate::error::GimbalError::Transport); callers
/// decide whether that is fatal (startup) or skippable (steady state).
///
/// Calls may overlap: the telemetry poller issues the IMU and encoder reads
/// concurrently on every tick. An implementation over a single serial link
/// must serialize access to it internally.
#[async_trait]
pub trait GimbalSession: Send + Sync {
    /// Query the current power/readiness state
    async fn status(&self) -> GimbalResult<GimbalStatus>;

    /// Switch motor power on or off
    async fn set_motor_power(&self, power: MotorPower) -> GimbalResult<()>;

    /// Set the stabilization mode
    async fn set_mode(&self, mode: GimbalMode) -> GimbalResult<()>;

    /// Configure all three axes in a single command
    async fn set_axis_modes(&self, tilt: AxisMode, roll: AxisMode, pan: AxisMode)
        -> GimbalResult<()>;

    /// Latest raw IMU sample
    async fn raw_inertial_sample(&self) -> GimbalResult<RawInertialSample>;

    /// Device timestamps of the latest telemetry
    async fn timestamps(&self) -> GimbalResult<GimbalTimestamps>;

    /// Latest mount pointing sample
    async fn mount_pointing_sample(&self) -> GimbalResult<MountPointingSample>;

    /// Command a pointing target, arguments in vendor (pitch, roll, yaw) order
    async fn set_pointing(&self, pitch: f32, roll: f32, yaw: f32) -> GimbalResult<()>;
}
