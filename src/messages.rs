//! Message types for the gimbal node
//!
//! Published telemetry, inbound goals, and the command enum that drives the
//! [`GimbalNode`](crate::node::GimbalNode) event loop. Callers talk to the
//! node through message passing only; nothing outside the loop touches the
//! gimbal session once startup has finished.

use crate::config::OperatingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;

/// Three-component vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Vector3 {
    /// Vector from components
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Inertial telemetry published on every poll tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuMessage {
    /// Device-reported timestamp (microseconds), not host wall clock
    pub stamp_usec: u64,
    /// Raw accelerometer reading
    pub linear_acceleration: Vector3,
    /// Raw gyroscope reading
    pub angular_velocity: Vector3,
}

/// Mount pointing published on every poll tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EncoderMessage {
    /// `x = roll, y = pitch, z = yaw`
    pub vector: Vector3,
}

/// Desired pointing target from a consumer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalCommand {
    /// Sent as the roll argument
    pub x: f64,
    /// Sent as the pitch argument
    pub y: f64,
    /// Sent as the yaw argument
    pub z: f64,
}

impl GoalCommand {
    /// Goal from components
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Commands that can be sent to the node event loop
#[derive(Debug)]
pub enum NodeCommand {
    /// Forward a pointing goal to the gimbal
    Goal(GoalCommand),

    /// Replace the live configuration
    Reconfigure {
        /// Replacement configuration
        config: OperatingConfig,
        /// New store generation
        response: oneshot::Sender<u64>,
    },

    /// Rebuild the telemetry timer from the current poll rate
    RestartTelemetryTimer {
        /// Period of the timer now running
        response: oneshot::Sender<Duration>,
    },

    /// Report the period of the running telemetry timer
    GetTelemetryPeriod {
        /// Period of the running timer
        response: oneshot::Sender<Duration>,
    },

    /// Stop the event loop
    Shutdown {
        /// Sent once the loop is about to exit
        response: oneshot::Sender<()>,
    },
}

impl NodeCommand {
    /// Helper to create a Reconfigure command
    pub fn reconfigure(config: OperatingConfig) -> (Self, oneshot::Receiver<u64>) {
        let (tx, rx) = oneshot::channel();
        (Self::Reconfigure { config, response: tx }, rx)
    }

    /// Helper to create a RestartTelemetryTimer command
    pub fn restart_telemetry_timer() -> (Self, oneshot::Receiver<Duration>) {
        let (tx, rx) = oneshot::channel();
        (Self::RestartTelemetryTimer { response: tx }, rx)
    }

    /// Helper to create a GetTelemetryPeriod command
    pub fn get_telemetry_period() -> (Self, oneshot::Receiver<Duration>) {
        let (tx, rx) = oneshot::channel();
        (Self::GetTelemetryPeriod { response: tx }, rx)
    }

    /// Helper to create a Shutdown command
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
