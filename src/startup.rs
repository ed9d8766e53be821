//! Startup sequencer
//!
//! Brings the gimbal from an unknown state to "ready for telemetry and
//! commands":
//!
//! 1. Query status; if the gimbal is `Off`, switch motor power on
//! 2. Poll status until it reports `On`
//! 3. Translate and send the gimbal mode
//! 4. Send the three axis modes as one combined command
//!
//! The sequence is an explicit state machine advanced by
//! [`StartupSequencer::step`]. [`StartupSequencer::run`] drives it, waiting
//! one poll interval between status queries with an async timer, so the
//! runtime thread is never blocked.
//!
//! ## Waiting for power-on
//!
//! By default the wait is unbounded: a gimbal that never reports `On`, or a
//! session call that never returns, keeps startup waiting forever.
//! [`StartupOptions`] adds an opt-in timeout (surfacing
//! [`GimbalError::ProtocolHang`]) and an opt-in cancellation signal
//! (surfacing [`GimbalError::Cancelled`]). Both cover the settle delay and
//! any session call in flight, not only the pause between polls.
//!
//! Any transport error aborts the sequence; later steps are never attempted.

use crate::config::OperatingConfig;
use crate::error::{GimbalError, GimbalResult};
use crate::gimbal::{GimbalSession, GimbalState, MotorPower};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Progress of the startup sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    /// Nothing sent yet
    Idle,
    /// Waiting for the gimbal to report `On`
    AwaitingPowerOn {
        /// Status queries made while waiting
        polls: u32,
    },
    /// Gimbal is on; mode and axis configuration pending
    Configuring,
    /// Mode and axes configured
    Ready,
}

impl StartupState {
    /// Display name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            StartupState::Idle => "Idle",
            StartupState::AwaitingPowerOn { .. } => "AwaitingPowerOn",
            StartupState::Configuring => "Configuring",
            StartupState::Ready => "Ready",
        }
    }
}

/// Opt-in bounds on the power-on wait
///
/// The default waits forever, matching deployed behavior.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    /// Give up with `ProtocolHang` after this long
    pub timeout: Option<Duration>,
    /// Give up with `Cancelled` once this reads `true`
    pub cancel: Option<watch::Receiver<bool>>,
}

impl StartupOptions {
    /// Fail with `ProtocolHang` once `timeout` has elapsed
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fail with `Cancelled` once `cancel` reads `true`
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Drives one bring-up of the gimbal
pub struct StartupSequencer {
    session: Arc<dyn GimbalSession>,
    config: Arc<OperatingConfig>,
    state: StartupState,
    power_on_sent: bool,
}

impl StartupSequencer {
    /// Create a sequencer for one bring-up using a configuration snapshot
    pub fn new(session: Arc<dyn GimbalSession>, config: Arc<OperatingConfig>) -> Self {
        Self {
            session,
            config,
            state: StartupState::Idle,
            power_on_sent: false,
        }
    }

    /// Current progress
    pub fn state(&self) -> StartupState {
        self.state
    }

    /// Whether this sequence switched motor power on
    pub fn power_on_sent(&self) -> bool {
        self.power_on_sent
    }

    /// Advance the state machine by one step
    ///
    /// Each call makes at most one status query or one configuration push.
    /// On error the state is left unchanged.
    pub async fn step(&mut self) -> GimbalResult<StartupState> {
        let next = match self.state {
            StartupState::Idle => {
                let status = self.session.status().await?;
                debug!("Initial gimbal state: {}", status.state.as_str());

                if status.state == GimbalState::Off {
                    info!("Gimbal is off, switching motor power on");
                    self.session.set_motor_power(MotorPower::On).await?;
                    self.power_on_sent = true;
                }
                StartupState::AwaitingPowerOn { polls: 0 }
            }
            StartupState::AwaitingPowerOn { polls } => {
                let status = self.session.status().await?;
                if status.state == GimbalState::On {
                    info!("Gimbal reported On after {} status polls", polls + 1);
                    StartupState::Configuring
                } else {
                    debug!("Waiting for power-on, gimbal is {}", status.state.as_str());
                    StartupState::AwaitingPowerOn { polls: polls + 1 }
                }
            }
            StartupState::Configuring => {
                // Translate everything before touching the hardware so a bad
                // code never leaves the gimbal half configured.
                let mode = self.config.gimbal_mode()?;
                let (tilt, roll, pan) = self.config.axis_modes()?;

                self.session.set_mode(mode).await?;
                info!("Gimbal mode set to {:?}", mode);

                self.session.set_axis_modes(tilt, roll, pan).await?;
                info!(
                    "Axis modes set: tilt={:?} roll={:?} pan={:?}",
                    tilt, roll, pan
                );
                StartupState::Ready
            }
            StartupState::Ready => StartupState::Ready,
        };

        self.state = next;
        Ok(next)
    }

    /// Drive the sequence to `Ready`
    ///
    /// The timeout and cancel signal bound the whole run: the settle delay,
    /// every poll wait and every session call in flight.
    pub async fn run(&mut self, options: StartupOptions) -> GimbalResult<()> {
        let StartupOptions { timeout, mut cancel } = options;
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);

        let settle = self.config.settle_delay();
        if !settle.is_zero() && self.state == StartupState::Idle {
            debug!("Waiting {:?} for the session to settle", settle);
            bounded(tokio::time::sleep(settle), started, deadline, &mut cancel).await?;
        }

        let mut ticker = tokio::time::interval(self.config.power_on_poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let StartupState::AwaitingPowerOn { .. } = self.state {
                bounded(ticker.tick(), started, deadline, &mut cancel).await?;
            }

            let state = bounded(self.step(), started, deadline, &mut cancel).await??;
            if state == StartupState::Ready {
                info!("Gimbal startup complete in {:?}", started.elapsed());
                return Ok(());
            }
        }
    }
}

/// Race `fut` against the startup deadline and the cancel signal
///
/// A losing `step()` is dropped before it records a transition, so the state
/// machine stays where it was.
async fn bounded<F: Future>(
    fut: F,
    started: Instant,
    deadline: Option<Instant>,
    cancel: &mut Option<watch::Receiver<bool>>,
) -> GimbalResult<F::Output> {
    tokio::select! {
        output = fut => Ok(output),
        _ = sleep_until_deadline(deadline) => Err(GimbalError::ProtocolHang {
            waited: started.elapsed(),
        }),
        _ = cancelled(cancel) => Err(GimbalError::Cancelled),
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without cancelling
            return std::future::pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gimbal::mock::{GimbalCall, GimbalOp, SimulatedGimbal};
    use crate::gimbal::{AxisInputMode, GimbalMode};

    fn fast_config() -> Arc<OperatingConfig> {
        Arc::new(OperatingConfig {
            settle_delay_ms: 0,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_off_on_sequence() {
        let gimbal = SimulatedGimbal::new().with_status_sequence([
            GimbalState::Off,
            GimbalState::Off,
            GimbalState::On,
        ]);
        let mut seq = StartupSequencer::new(Arc::new(gimbal.clone()), fast_config());

        seq.run(StartupOptions::default()).await.unwrap();

        assert_eq!(seq.state(), StartupState::Ready);
        assert!(seq.power_on_sent());
        assert_eq!(gimbal.calls_of(GimbalOp::SetMotorPower).len(), 1);
        assert_eq!(gimbal.calls_of(GimbalOp::SetMode).len(), 1);
        assert_eq!(gimbal.calls_of(GimbalOp::SetAxisModes).len(), 1);

        // Mode and axis commands only after the third status (the ON reply)
        let calls = gimbal.calls();
        let statuses_before_mode = calls
            .iter()
            .take_while(|c| c.op() != GimbalOp::SetMode)
            .filter(|c| **c == GimbalCall::Status)
            .count();
        assert_eq!(statuses_before_mode, 3);
        assert_eq!(calls[1], GimbalCall::SetMotorPower(MotorPower::On));
        assert_eq!(calls[calls.len() - 1].op(), GimbalOp::SetAxisModes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_on_skips_power_on() {
        let gimbal = SimulatedGimbal::with_initial_state(GimbalState::On);
        let mut seq = StartupSequencer::new(Arc::new(gimbal.clone()), fast_config());

        seq.run(StartupOptions::default()).await.unwrap();

        assert!(!seq.power_on_sent());
        assert!(gimbal.calls_of(GimbalOp::SetMotorPower).is_empty());
        assert_eq!(gimbal.mode(), Some(GimbalMode::Lock));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_configured_modes() {
        let gimbal = SimulatedGimbal::with_initial_state(GimbalState::On);
        let config = Arc::new(OperatingConfig {
            settle_delay_ms: 0,
            gimbal_mode: 2,
            tilt_axis_input_mode: 1,
            roll_axis_stabilize: false,
            pan_axis_input_mode: 2,
            ..Default::default()
        });
        let mut seq = StartupSequencer::new(Arc::new(gimbal.clone()), config);

        seq.run(StartupOptions::default()).await.unwrap();

        assert_eq!(gimbal.mode(), Some(GimbalMode::Follow));
        match &gimbal.calls_of(GimbalOp::SetAxisModes)[0] {
            GimbalCall::SetAxisModes { tilt, roll, pan } => {
                assert_eq!(tilt.input_mode, AxisInputMode::AngularRate);
                assert!(!roll.stabilize);
                assert_eq!(pan.input_mode, AxisInputMode::AbsoluteFrameAngle);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_mode_sends_nothing() {
        let gimbal = SimulatedGimbal::with_initial_state(GimbalState::On);
        let config = Arc::new(OperatingConfig {
            settle_delay_ms: 0,
            roll_axis_input_mode: 5,
            ..Default::default()
        });
        let mut seq = StartupSequencer::new(Arc::new(gimbal.clone()), config);

        let err = seq.run(StartupOptions::default()).await.unwrap_err();

        assert!(matches!(err, GimbalError::Configuration(_)));
        assert!(gimbal.calls_of(GimbalOp::SetMode).is_empty());
        assert!(gimbal.calls_of(GimbalOp::SetAxisModes).is_empty());
        assert_eq!(seq.state(), StartupState::Configuring);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_aborts_before_configuration() {
        let gimbal = SimulatedGimbal::new();
        gimbal.fail_next(GimbalOp::SetMotorPower);
        let mut seq = StartupSequencer::new(Arc::new(gimbal.clone()), fast_config());

        let err = seq.run(StartupOptions::default()).await.unwrap_err();

        assert!(err.is_transient());
        assert!(gimbal.calls_of(GimbalOp::SetMode).is_empty());
        assert!(gimbal.calls_of(GimbalOp::SetAxisModes).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_protocol_hang() {
        // Stays in Init forever
        let gimbal = SimulatedGimbal::new().with_init_polls(u32::MAX);
        let mut seq = StartupSequencer::new(Arc::new(gimbal.clone()), fast_config());

        let err = seq
            .run(StartupOptions::default().with_timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();

        match err {
            GimbalError::ProtocolHang { waited } => {
                assert!(waited >= Duration::from_millis(500))
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(seq.state(), StartupState::AwaitingPowerOn { .. }));
        assert!(gimbal.calls_of(GimbalOp::SetMode).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_hung_status_query() {
        let gimbal = SimulatedGimbal::new().with_latency(Duration::from_secs(3600));
        let mut seq = StartupSequencer::new(Arc::new(gimbal), fast_config());

        let err = seq
            .run(StartupOptions::default().with_timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();

        match err {
            GimbalError::ProtocolHang { waited } => {
                assert_eq!(waited, Duration::from_millis(500))
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(seq.state(), StartupState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hung_status_query() {
        let gimbal = SimulatedGimbal::new().with_latency(Duration::from_secs(3600));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut seq = StartupSequencer::new(Arc::new(gimbal), fast_config());

        let task = tokio::spawn(async move {
            seq.run(StartupOptions::default().with_cancel(cancel_rx))
                .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel_tx.send(true).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("cancel did not interrupt the status query")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, GimbalError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_covers_settle_delay() {
        let gimbal = SimulatedGimbal::with_initial_state(GimbalState::On);
        let config = Arc::new(OperatingConfig {
            settle_delay_ms: 10_000,
            ..Default::default()
        });
        let mut seq = StartupSequencer::new(Arc::new(gimbal.clone()), config);

        let err = seq
            .run(StartupOptions::default().with_timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();

        assert!(matches!(err, GimbalError::ProtocolHang { .. }));
        assert!(gimbal.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_wait() {
        let gimbal = SimulatedGimbal::new().with_init_polls(u32::MAX);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut seq = StartupSequencer::new(Arc::new(gimbal), fast_config());

        let task = tokio::spawn(async move {
            seq.run(StartupOptions::default().with_cancel(cancel_rx))
                .await
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel_tx.send(true).unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, GimbalError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_configured_interval() {
        let gimbal = SimulatedGimbal::new().with_init_polls(u32::MAX);
        let mut seq = StartupSequencer::new(Arc::new(gimbal.clone()), fast_config());

        let _ = seq
            .run(StartupOptions::default().with_timeout(Duration::from_millis(1000)))
            .await;

        // One initial query, then one immediately after power-on and one per
        // 50 ms over the remaining second
        let polls = gimbal.calls_of(GimbalOp::Status).len();
        assert!((20..=23).contains(&polls), "polls = {}", polls);
    }

    #[tokio::test]
    async fn test_step_by_step() {
        let gimbal = SimulatedGimbal::new().with_init_polls(0);
        let mut seq = StartupSequencer::new(Arc::new(gimbal), fast_config());

        assert_eq!(
            seq.step().await.unwrap(),
            StartupState::AwaitingPowerOn { polls: 0 }
        );
        assert_eq!(seq.step().await.unwrap(), StartupState::Configuring);
        assert_eq!(seq.step().await.unwrap(), StartupState::Ready);
    }
}
