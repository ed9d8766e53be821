//! Telemetry poller and publisher
//!
//! On each tick the poller reads the raw IMU sample and the mount pointing
//! sample, converts them, and publishes them on two independent broadcast
//! channels. The two reads run concurrently and are handled separately: a
//! failed or slow IMU read never suppresses the encoder message, and vice
//! versa. A failed read is logged and only that emission is skipped.
//!
//! The IMU message is stamped with the device clock (`timestamps().raw_imu`),
//! not host time.

use crate::config::OperatingConfig;
use crate::error::GimbalResult;
use crate::gimbal::GimbalSession;
use crate::messages::{EncoderMessage, ImuMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{trace, warn};

/// Broadcast outlets for published telemetry
#[derive(Clone)]
pub struct TelemetryPublisher {
    imu_topic: Arc<str>,
    encoder_topic: Arc<str>,
    imu_tx: broadcast::Sender<ImuMessage>,
    encoder_tx: broadcast::Sender<EncoderMessage>,
}

impl TelemetryPublisher {
    /// Create outlets named after the configured topics
    pub fn new(config: &OperatingConfig) -> Self {
        let capacity = config.publish_queue_size.max(1);
        let (imu_tx, _) = broadcast::channel(capacity);
        let (encoder_tx, _) = broadcast::channel(capacity);
        Self {
            imu_topic: Arc::from(config.imu_topic.as_str()),
            encoder_topic: Arc::from(config.encoder_topic.as_str()),
            imu_tx,
            encoder_tx,
        }
    }

    /// Receiver for IMU telemetry
    pub fn subscribe_imu(&self) -> broadcast::Receiver<ImuMessage> {
        self.imu_tx.subscribe()
    }

    /// Receiver for mount pointing telemetry
    pub fn subscribe_encoder(&self) -> broadcast::Receiver<EncoderMessage> {
        self.encoder_tx.subscribe()
    }

    /// IMU topic name
    pub fn imu_topic(&self) -> &str {
        &self.imu_topic
    }

    /// Encoder topic name
    pub fn encoder_topic(&self) -> &str {
        &self.encoder_topic
    }

    fn publish_imu(&self, msg: ImuMessage) {
        // No subscribers is not an error
        if self.imu_tx.send(msg).is_err() {
            trace!("No subscribers on {}", self.imu_topic);
        }
    }

    fn publish_encoder(&self, msg: EncoderMessage) {
        if self.encoder_tx.send(msg).is_err() {
            trace!("No subscribers on {}", self.encoder_topic);
        }
    }
}

/// Counters kept by the poller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    /// Poll cycles run
    pub ticks: u64,
    /// IMU messages published
    pub imu_published: u64,
    /// IMU emissions skipped after a failed read
    pub imu_skipped: u64,
    /// Encoder messages published
    pub encoder_published: u64,
    /// Encoder emissions skipped after a failed read
    pub encoder_skipped: u64,
}

/// Reads telemetry from the session and publishes it
pub struct TelemetryPoller {
    session: Arc<dyn GimbalSession>,
    publisher: TelemetryPublisher,
    stats: TelemetryStats,
}

impl TelemetryPoller {
    /// Poller reading from `session` into `publisher`
    pub fn new(session: Arc<dyn GimbalSession>, publisher: TelemetryPublisher) -> Self {
        Self {
            session,
            publisher,
            stats: TelemetryStats::default(),
        }
    }

    /// Counters so far
    pub fn stats(&self) -> TelemetryStats {
        self.stats
    }

    /// Run one emission cycle
    pub async fn poll_once(&mut self) {
        self.stats.ticks += 1;
        let (imu, encoder) = tokio::join!(self.read_imu(), self.read_encoder());

        match imu {
            Ok(msg) => {
                self.publisher.publish_imu(msg);
                self.stats.imu_published += 1;
            }
            Err(e) => {
                warn!("Skipping {} this tick: {}", self.publisher.imu_topic, e);
                self.stats.imu_skipped += 1;
            }
        }

        match encoder {
            Ok(msg) => {
                self.publisher.publish_encoder(msg);
                self.stats.encoder_published += 1;
            }
            Err(e) => {
                warn!("Skipping {} this tick: {}", self.publisher.encoder_topic, e);
                self.stats.encoder_skipped += 1;
            }
        }
    }

    async fn read_imu(&self) -> GimbalResult<ImuMessage> {
        let mut sample = self.session.raw_inertial_sample().await?;
        // TODO: stamp with host time once consumers agree on a clock source
        sample.time_usec = self.session.timestamps().await?.raw_imu;
        Ok(ImuMessage::from(&sample))
    }

    async fn read_encoder(&self) -> GimbalResult<EncoderMessage> {
        let sample = self.session.mount_pointing_sample().await?;
        Ok(EncoderMessage::from(&sample))
    }
}

/// Fixed-period telemetry timer
///
/// The period is captured from `state_poll_rate` when the timer is created.
/// Later configuration changes only take effect through a new timer.
pub struct TelemetryTimer {
    interval: Interval,
    period: Duration,
}

impl TelemetryTimer {
    /// Timer at `1 / state_poll_rate`, failing on an unusable rate
    pub fn from_config(config: &OperatingConfig) -> GimbalResult<Self> {
        let period = config.poll_period()?;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Self { interval, period })
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick. Cancel safe.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gimbal::mock::{GimbalOp, SimulatedGimbal};
    use crate::gimbal::{MountPointingSample, RawInertialSample};
    use crate::messages::Vector3;
    use tracing_test::traced_test;

    fn poller_with(gimbal: &SimulatedGimbal) -> (TelemetryPoller, TelemetryPublisher) {
        let publisher = TelemetryPublisher::new(&OperatingConfig::default());
        let poller = TelemetryPoller::new(Arc::new(gimbal.clone()), publisher.clone());
        (poller, publisher)
    }

    #[tokio::test]
    async fn test_publishes_both_messages() {
        let gimbal = SimulatedGimbal::new();
        gimbal.set_raw_imu(RawInertialSample {
            time_usec: 0,
            xacc: 1,
            yacc: 2,
            zacc: 3,
            xgyro: 4,
            ygyro: 5,
            zgyro: 6,
        });
        gimbal.set_mount_pointing(MountPointingSample {
            pitch: 1.5,
            roll: -2.0,
            yaw: 90.0,
        });
        let (mut poller, publisher) = poller_with(&gimbal);
        let mut imu_rx = publisher.subscribe_imu();
        let mut encoder_rx = publisher.subscribe_encoder();

        poller.poll_once().await;

        let imu = imu_rx.recv().await.unwrap();
        assert_eq!(imu.linear_acceleration, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(imu.angular_velocity, Vector3::new(4.0, 5.0, 6.0));

        let encoder = encoder_rx.recv().await.unwrap();
        assert_eq!(encoder.vector, Vector3::new(-2.0, 1.5, 90.0));
    }

    #[tokio::test]
    async fn test_imu_uses_device_timestamp() {
        let gimbal = SimulatedGimbal::new();
        let (mut poller, publisher) = poller_with(&gimbal);
        let mut imu_rx = publisher.subscribe_imu();

        poller.poll_once().await;
        poller.poll_once().await;

        assert_eq!(imu_rx.recv().await.unwrap().stamp_usec, 1_000);
        assert_eq!(imu_rx.recv().await.unwrap().stamp_usec, 2_000);
        assert_eq!(gimbal.calls_of(GimbalOp::Timestamps).len(), 2);
    }

    #[tokio::test]
    async fn test_imu_failure_does_not_suppress_encoder() {
        let gimbal = SimulatedGimbal::new();
        gimbal.fail_next(GimbalOp::RawInertialSample);
        let (mut poller, publisher) = poller_with(&gimbal);
        let mut imu_rx = publisher.subscribe_imu();
        let mut encoder_rx = publisher.subscribe_encoder();

        poller.poll_once().await;

        assert!(encoder_rx.try_recv().is_ok());
        assert!(imu_rx.try_recv().is_err());
        let stats = poller.stats();
        assert_eq!(stats.imu_skipped, 1);
        assert_eq!(stats.encoder_published, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_skipped_emission_is_logged() {
        let gimbal = SimulatedGimbal::new();
        gimbal.fail_next(GimbalOp::RawInertialSample);
        let (mut poller, _publisher) = poller_with(&gimbal);

        poller.poll_once().await;

        assert!(logs_contain("Skipping /gimbal/imu/data this tick"));
        assert!(!logs_contain("Skipping /gimbal/encoder this tick"));
    }

    #[tokio::test]
    async fn test_encoder_failure_does_not_suppress_imu() {
        let gimbal = SimulatedGimbal::new();
        gimbal.fail_next(GimbalOp::MountPointingSample);
        let (mut poller, publisher) = poller_with(&gimbal);
        let mut imu_rx = publisher.subscribe_imu();
        let mut encoder_rx = publisher.subscribe_encoder();

        poller.poll_once().await;

        assert!(imu_rx.try_recv().is_ok());
        assert!(encoder_rx.try_recv().is_err());
        assert_eq!(poller.stats().encoder_skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_overlap_within_a_tick() {
        // 100 ms per call: IMU path is two calls, encoder path is one
        let gimbal = SimulatedGimbal::new().with_latency(Duration::from_millis(100));
        let (mut poller, _publisher) = poller_with(&gimbal);

        let start = tokio::time::Instant::now();
        poller.poll_once().await;

        assert_eq!(start.elapsed(), Duration::from_millis(200));
        assert_eq!(poller.stats().imu_published, 1);
        assert_eq!(poller.stats().encoder_published, 1);
    }

    #[tokio::test]
    async fn test_timestamp_failure_skips_imu_only() {
        let gimbal = SimulatedGimbal::new();
        gimbal.fail_next(GimbalOp::Timestamps);
        let (mut poller, _publisher) = poller_with(&gimbal);

        poller.poll_once().await;
        poller.poll_once().await;

        let stats = poller.stats();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.imu_skipped, 1);
        assert_eq!(stats.imu_published, 1);
        assert_eq!(stats.encoder_published, 2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let gimbal = SimulatedGimbal::new();
        let (mut poller, _publisher) = poller_with(&gimbal);

        poller.poll_once().await;
        assert_eq!(poller.stats().imu_published, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_period_from_poll_rate() {
        let config = OperatingConfig {
            state_poll_rate: 10.0,
            ..Default::default()
        };
        let mut timer = TelemetryTimer::from_config(&config).unwrap();
        assert_eq!(timer.period(), Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        timer.tick().await; // immediate
        timer.tick().await;
        timer.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[test]
    fn test_timer_rejects_zero_rate() {
        let config = OperatingConfig {
            state_poll_rate: 0.0,
            ..Default::default()
        };
        assert!(TelemetryTimer::from_config(&config).is_err());
    }
}
