//! Simulated gimbal
//!
//! In-process [`GimbalSession`] used by the test suite and by the
//! `gimbal_node` binary. It provides:
//! - A power model: after a motor-on command the gimbal reports `Init` for a
//!   configurable number of status queries, then `On`
//! - Scripted status sequences that override the power model
//! - Failure injection per operation (one-shot or persistent)
//! - A call log for test verification
//!
//! Pointing commands move the simulated mount instantly, so the encoder
//! telemetry echoes the last command.

use super::{
    AxisMode, GimbalMode, GimbalSession, GimbalState, GimbalStatus, GimbalTimestamps,
    MotorPower, MountPointingSample, RawInertialSample,
};
use crate::error::{GimbalError, GimbalResult};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Operation selector for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GimbalOp {
    /// [`GimbalSession::status`]
    Status,
    /// [`GimbalSession::set_motor_power`]
    SetMotorPower,
    /// [`GimbalSession::set_mode`]
    SetMode,
    /// [`GimbalSession::set_axis_modes`]
    SetAxisModes,
    /// [`GimbalSession::raw_inertial_sample`]
    RawInertialSample,
    /// [`GimbalSession::timestamps`]
    Timestamps,
    /// [`GimbalSession::mount_pointing_sample`]
    MountPointingSample,
    /// [`GimbalSession::set_pointing`]
    SetPointing,
}

/// Recorded call on the simulated gimbal
#[derive(Debug, Clone, PartialEq)]
pub enum GimbalCall {
    /// Status query
    Status,
    /// Motor power command
    SetMotorPower(MotorPower),
    /// Mode command
    SetMode(GimbalMode),
    /// Combined axis configuration
    SetAxisModes {
        /// Tilt axis
        tilt: AxisMode,
        /// Roll axis
        roll: AxisMode,
        /// Pan axis
        pan: AxisMode,
    },
    /// IMU read
    RawInertialSample,
    /// Timestamp read
    Timestamps,
    /// Mount pointing read
    MountPointingSample,
    /// Pointing command, vendor argument order
    SetPointing {
        /// Pitch argument
        pitch: f32,
        /// Roll argument
        roll: f32,
        /// Yaw argument
        yaw: f32,
    },
}

impl GimbalCall {
    /// Operation this call belongs to
    pub fn op(&self) -> GimbalOp {
        match self {
            GimbalCall::Status => GimbalOp::Status,
            GimbalCall::SetMotorPower(_) => GimbalOp::SetMotorPower,
            GimbalCall::SetMode(_) => GimbalOp::SetMode,
            GimbalCall::SetAxisModes { .. } => GimbalOp::SetAxisModes,
            GimbalCall::RawInertialSample => GimbalOp::RawInertialSample,
            GimbalCall::Timestamps => GimbalOp::Timestamps,
            GimbalCall::MountPointingSample => GimbalOp::MountPointingSample,
            GimbalCall::SetPointing { .. } => GimbalOp::SetPointing,
        }
    }
}

struct SimState {
    state: GimbalState,
    init_polls_remaining: u32,
    init_polls: u32,
    scripted_status: VecDeque<GimbalState>,
    mode: Option<GimbalMode>,
    imu: RawInertialSample,
    imu_clock_usec: u64,
    pointing: MountPointingSample,
    fail_once: HashSet<GimbalOp>,
    fail_always: HashSet<GimbalOp>,
    calls: Vec<GimbalCall>,
}

/// Simulated gimbal session
///
/// Cloning shares the underlying state, so a test can keep a handle while
/// the node owns another.
///
/// # Example
///
/// ```
/// use gimbal_node::gimbal::mock::SimulatedGimbal;
/// use gimbal_node::gimbal::GimbalState;
///
/// let gimbal = SimulatedGimbal::new()
///     .with_status_sequence([GimbalState::Off, GimbalState::Off, GimbalState::On]);
/// assert!(gimbal.calls().is_empty());
/// ```
#[derive(Clone)]
pub struct SimulatedGimbal {
    inner: Arc<Mutex<SimState>>,
    latency: Duration,
}

impl Default for SimulatedGimbal {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGimbal {
    /// Powered-off gimbal that reaches `On` two status polls after motor-on
    pub fn new() -> Self {
        Self::with_initial_state(GimbalState::Off)
    }

    /// Gimbal that starts in `state`
    pub fn with_initial_state(state: GimbalState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                state,
                init_polls_remaining: 0,
                init_polls: 2,
                scripted_status: VecDeque::new(),
                mode: None,
                imu: RawInertialSample::default(),
                imu_clock_usec: 0,
                pointing: MountPointingSample::default(),
                fail_once: HashSet::new(),
                fail_always: HashSet::new(),
                calls: Vec::new(),
            })),
            latency: Duration::ZERO,
        }
    }

    /// Number of status polls spent in `Init` after a motor-on command
    pub fn with_init_polls(self, polls: u32) -> Self {
        self.state().init_polls = polls;
        self
    }

    /// Status replies returned in order before the power model takes over
    pub fn with_status_sequence(self, states: impl IntoIterator<Item = GimbalState>) -> Self {
        self.state().scripted_status = states.into_iter().collect();
        self
    }

    /// Simulated per-call transport latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the IMU sample returned by subsequent reads
    pub fn set_raw_imu(&self, sample: RawInertialSample) {
        self.state().imu = sample;
    }

    /// Set the mount pointing returned by subsequent reads
    pub fn set_mount_pointing(&self, sample: MountPointingSample) {
        self.state().pointing = sample;
    }

    /// Fail the next call of `op` with a transport error
    pub fn fail_next(&self, op: GimbalOp) {
        self.state().fail_once.insert(op);
    }

    /// Fail every call of `op` until [`clear_failures`](Self::clear_failures)
    pub fn fail_always(&self, op: GimbalOp) {
        self.state().fail_always.insert(op);
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_once.clear();
        state.fail_always.clear();
    }

    /// Snapshot of all calls made so far
    pub fn calls(&self) -> Vec<GimbalCall> {
        self.state().calls.clone()
    }

    /// Calls of a single operation
    pub fn calls_of(&self, op: GimbalOp) -> Vec<GimbalCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .cloned()
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Last mode set on the gimbal
    pub fn mode(&self) -> Option<GimbalMode> {
        self.state().mode
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call and apply failure injection
    async fn begin(&self, call: GimbalCall) -> GimbalResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let op = call.op();
        let mut state = self.state();
        state.calls.push(call);
        if state.fail_once.remove(&op) || state.fail_always.contains(&op) {
            return Err(GimbalError::transport(format!(
                "simulated {:?} failure",
                op
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GimbalSession for SimulatedGimbal {
    async fn status(&self) -> GimbalResult<GimbalStatus> {
        self.begin(GimbalCall::Status).await?;
        let mut state = self.state();

        if let Some(scripted) = state.scripted_status.pop_front() {
            state.state = scripted;
            return Ok(GimbalStatus::new(scripted));
        }

        if state.state == GimbalState::Init {
            if state.init_polls_remaining == 0 {
                state.state = GimbalState::On;
            } else {
                state.init_polls_remaining -= 1;
            }
        }
        Ok(GimbalStatus::new(state.state))
    }

    async fn set_motor_power(&self, power: MotorPower) -> GimbalResult<()> {
        self.begin(GimbalCall::SetMotorPower(power)).await?;
        let mut state = self.state();
        match power {
            MotorPower::On => {
                if state.state == GimbalState::Off {
                    state.state = GimbalState::Init;
                    state.init_polls_remaining = state.init_polls;
                }
            }
            MotorPower::Off => state.state = GimbalState::Off,
        }
        Ok(())
    }

    async fn set_mode(&self, mode: GimbalMode) -> GimbalResult<()> {
        self.begin(GimbalCall::SetMode(mode)).await?;
        self.state().mode = Some(mode);
        Ok(())
    }

    async fn set_axis_modes(
        &self,
        tilt: AxisMode,
        roll: AxisMode,
        pan: AxisMode,
    ) -> GimbalResult<()> {
        self.begin(GimbalCall::SetAxisModes { tilt, roll, pan }).await
    }

    async fn raw_inertial_sample(&self) -> GimbalResult<RawInertialSample> {
        self.begin(GimbalCall::RawInertialSample).await?;
        let mut state = self.state();
        state.imu_clock_usec += 1_000;
        state.imu.time_usec = state.imu_clock_usec;
        Ok(state.imu)
    }

    async fn timestamps(&self) -> GimbalResult<GimbalTimestamps> {
        self.begin(GimbalCall::Timestamps).await?;
        let state = self.state();
        Ok(GimbalTimestamps {
            raw_imu: state.imu_clock_usec,
            mount_orientation: state.imu_clock_usec,
        })
    }

    async fn mount_pointing_sample(&self) -> GimbalResult<MountPointingSample> {
        self.begin(GimbalCall::MountPointingSample).await?;
        Ok(self.state().pointing)
    }

    async fn set_pointing(&self, pitch: f32, roll: f32, yaw: f32) -> GimbalResult<()> {
        self.begin(GimbalCall::SetPointing { pitch, roll, yaw }).await?;
        self.state().pointing = MountPointingSample { pitch, roll, yaw };
        Ok(())
    }
}
