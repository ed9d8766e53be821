//! Conversions between configuration codes, vendor samples and published messages
//!
//! All functions here are pure. Integer codes outside their closed range are
//! rejected with [`GimbalError::Configuration`] rather than mapped to a
//! fallback value.
//!
//! ## Axis ordering
//!
//! The vendor pointing call takes (pitch, roll, yaw). Goal vectors are
//! forwarded as `(y, x, z)` and mount pointing is published as
//! `x = roll, y = pitch, z = yaw`. These orderings match what is observed on
//! deployed systems and are kept as-is.

use crate::error::{GimbalError, GimbalResult};
use crate::gimbal::{AxisInputMode, GimbalMode, MountPointingSample, RawInertialSample};
use crate::messages::{EncoderMessage, GoalCommand, ImuMessage, Vector3};

impl TryFrom<i32> for GimbalMode {
    type Error = GimbalError;

    fn try_from(code: i32) -> GimbalResult<Self> {
        match code {
            0 => Ok(GimbalMode::Off),
            1 => Ok(GimbalMode::Lock),
            2 => Ok(GimbalMode::Follow),
            other => Err(GimbalError::Configuration(format!(
                "Invalid gimbal_mode {}. Must be 0 (OFF), 1 (LOCK) or 2 (FOLLOW)",
                other
            ))),
        }
    }
}

impl TryFrom<i32> for AxisInputMode {
    type Error = GimbalError;

    fn try_from(code: i32) -> GimbalResult<Self> {
        match code {
            0 => Ok(AxisInputMode::BodyFrameAngle),
            1 => Ok(AxisInputMode::AngularRate),
            2 => Ok(AxisInputMode::AbsoluteFrameAngle),
            other => Err(GimbalError::Configuration(format!(
                "Invalid axis input mode {}. Must be 0 (BODY_FRAME_ANGLE), 1 (ANGULAR_RATE) or 2 (ABSOLUTE_FRAME_ANGLE)",
                other
            ))),
        }
    }
}

/// Direct field copy, no scaling.
impl From<&RawInertialSample> for ImuMessage {
    fn from(sample: &RawInertialSample) -> Self {
        ImuMessage {
            stamp_usec: sample.time_usec,
            linear_acceleration: Vector3::new(
                f64::from(sample.xacc),
                f64::from(sample.yacc),
                f64::from(sample.zacc),
            ),
            angular_velocity: Vector3::new(
                f64::from(sample.xgyro),
                f64::from(sample.ygyro),
                f64::from(sample.zgyro),
            ),
        }
    }
}

impl From<&MountPointingSample> for EncoderMessage {
    fn from(sample: &MountPointingSample) -> Self {
        EncoderMessage {
            vector: Vector3::new(
                f64::from(sample.roll),
                f64::from(sample.pitch),
                f64::from(sample.yaw),
            ),
        }
    }
}

/// Vendor (pitch, roll, yaw) arguments for a goal: `(y, x, z)`.
pub fn pointing_args(goal: &GoalCommand) -> (f32, f32, f32) {
    (goal.y as f32, goal.x as f32, goal.z as f32)
}
