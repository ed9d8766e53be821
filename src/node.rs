//! Gimbal node event loop
//!
//! The node owns the gimbal session, the configuration store, the telemetry
//! poller and the command forwarder. A single async task runs
//! [`GimbalNode::run`], which serializes every piece of work:
//!
//! - telemetry timer ticks
//! - inbound goals
//! - reconfiguration (from handles and from the config file watcher)
//! - timer restarts and shutdown
//!
//! Only this task touches the session after startup, so no other task
//! competes for the transport. Within a telemetry tick the IMU and encoder
//! reads still overlap; see [`GimbalSession`] for what that asks of an
//! implementation. Callers interact through a cloneable [`GimbalNodeHandle`].
//!
//! Startup runs first via [`GimbalNode::startup`]. Commands sent while it is
//! still waiting for power-on are queued and handled once the loop starts.

use crate::config::{ConfigStore, ConfigWatcher, OperatingConfig};
use crate::error::{GimbalError, GimbalResult};
use crate::forwarder::CommandForwarder;
use crate::gimbal::GimbalSession;
use crate::messages::{EncoderMessage, GoalCommand, ImuMessage, NodeCommand};
use crate::startup::{StartupOptions, StartupSequencer};
use crate::telemetry::{TelemetryPoller, TelemetryPublisher, TelemetryTimer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Capacity of the node command channel
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Gimbal node owning the session and the steady-state components
pub struct GimbalNode {
    session: Arc<dyn GimbalSession>,
    store: ConfigStore,
    poller: TelemetryPoller,
    forwarder: CommandForwarder,
    command_rx: mpsc::Receiver<NodeCommand>,
    config_updates: Option<mpsc::UnboundedReceiver<OperatingConfig>>,
    watcher: Option<ConfigWatcher>,
}

impl GimbalNode {
    /// Create a node and the handle used to talk to it
    pub fn new(
        session: Arc<dyn GimbalSession>,
        config: OperatingConfig,
    ) -> (Self, GimbalNodeHandle) {
        let publisher = TelemetryPublisher::new(&config);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let node = Self {
            poller: TelemetryPoller::new(Arc::clone(&session), publisher.clone()),
            forwarder: CommandForwarder::new(Arc::clone(&session)),
            session,
            store: ConfigStore::new(config),
            command_rx,
            config_updates: None,
            watcher: None,
        };
        let handle = GimbalNodeHandle {
            command_tx,
            publisher,
        };
        (node, handle)
    }

    /// Attach a config file watcher
    ///
    /// The node keeps the watcher for as long as it runs, so file updates
    /// keep arriving after startup.
    pub fn with_config_watcher(
        mut self,
        watcher: ConfigWatcher,
        updates: mpsc::UnboundedReceiver<OperatingConfig>,
    ) -> Self {
        self.watcher = Some(watcher);
        self.config_updates = Some(updates);
        self
    }

    /// Snapshot of the live configuration
    pub fn config(&self) -> Arc<OperatingConfig> {
        self.store.current()
    }

    /// Bring the gimbal to the configured, ready state
    ///
    /// Errors here are fatal to the node; the caller should not call
    /// [`run`](Self::run) afterwards.
    pub async fn startup(&mut self, options: StartupOptions) -> GimbalResult<()> {
        let mut sequencer = StartupSequencer::new(Arc::clone(&self.session), self.store.current());
        sequencer.run(options).await
    }

    /// Run the event loop until shutdown or until every handle is dropped
    pub async fn run(self) -> GimbalResult<()> {
        let GimbalNode {
            session: _,
            mut store,
            mut poller,
            mut forwarder,
            mut command_rx,
            mut config_updates,
            watcher,
        } = self;

        let mut timer = TelemetryTimer::from_config(&store.current())?;
        info!(
            "Gimbal node running, telemetry every {:?}{}",
            timer.period(),
            match &watcher {
                Some(w) => format!(", watching {}", w.path().display()),
                None => String::new(),
            }
        );

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    poller.poll_once().await;
                }
                command = command_rx.recv() => match command {
                    Some(NodeCommand::Goal(goal)) => {
                        if let Err(e) = forwarder.forward(goal).await {
                            warn!("Dropping goal ({}, {}, {}): {}", goal.x, goal.y, goal.z, e);
                        }
                    }
                    Some(NodeCommand::Reconfigure { config, response }) => {
                        let generation = store.apply(config);
                        info!("Configuration updated (generation {})", generation);
                        let _ = response.send(generation);
                    }
                    Some(NodeCommand::RestartTelemetryTimer { response }) => {
                        match TelemetryTimer::from_config(&store.current()) {
                            Ok(new_timer) => {
                                info!(
                                    "Telemetry timer restarted: {:?} -> {:?}",
                                    timer.period(),
                                    new_timer.period()
                                );
                                timer = new_timer;
                            }
                            Err(e) => {
                                warn!("Keeping telemetry period {:?}: {}", timer.period(), e);
                            }
                        }
                        let _ = response.send(timer.period());
                    }
                    Some(NodeCommand::GetTelemetryPeriod { response }) => {
                        let _ = response.send(timer.period());
                    }
                    Some(NodeCommand::Shutdown { response }) => {
                        info!("Shutdown command received");
                        let _ = response.send(());
                        break;
                    }
                    None => {
                        debug!("All node handles dropped");
                        break;
                    }
                },
                Some(config) = next_update(&mut config_updates) => {
                    let generation = store.apply(config);
                    info!("Configuration reloaded from file (generation {})", generation);
                }
            }
        }

        let stats = poller.stats();
        info!(
            "Gimbal node stopped after {} ticks ({} IMU / {} encoder skipped), {} goals forwarded, {} failed",
            stats.ticks,
            stats.imu_skipped,
            stats.encoder_skipped,
            forwarder.forwarded(),
            forwarder.failed()
        );
        Ok(())
    }
}

async fn next_update(
    updates: &mut Option<mpsc::UnboundedReceiver<OperatingConfig>>,
) -> Option<OperatingConfig> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running node
#[derive(Clone)]
pub struct GimbalNodeHandle {
    command_tx: mpsc::Sender<NodeCommand>,
    publisher: TelemetryPublisher,
}

impl GimbalNodeHandle {
    /// Send a pointing goal; it is forwarded as soon as the loop sees it
    pub async fn send_goal(&self, goal: GoalCommand) -> GimbalResult<()> {
        self.command_tx
            .send(NodeCommand::Goal(goal))
            .await
            .map_err(|_| GimbalError::NodeStopped)
    }

    /// Replace the live configuration; returns the new generation
    ///
    /// The telemetry timer keeps its period until
    /// [`restart_telemetry_timer`](Self::restart_telemetry_timer) is called.
    pub async fn reconfigure(&self, config: OperatingConfig) -> GimbalResult<u64> {
        let (cmd, rx) = NodeCommand::reconfigure(config);
        self.request(cmd, rx).await
    }

    /// Recreate the telemetry timer from the current poll rate
    pub async fn restart_telemetry_timer(&self) -> GimbalResult<Duration> {
        let (cmd, rx) = NodeCommand::restart_telemetry_timer();
        self.request(cmd, rx).await
    }

    /// Period of the running telemetry timer
    pub async fn telemetry_period(&self) -> GimbalResult<Duration> {
        let (cmd, rx) = NodeCommand::get_telemetry_period();
        self.request(cmd, rx).await
    }

    /// Stop the event loop
    pub async fn shutdown(&self) -> GimbalResult<()> {
        let (cmd, rx) = NodeCommand::shutdown();
        self.request(cmd, rx).await
    }

    /// Receiver for IMU telemetry
    pub fn subscribe_imu(&self) -> broadcast::Receiver<ImuMessage> {
        self.publisher.subscribe_imu()
    }

    /// Receiver for mount pointing telemetry
    pub fn subscribe_encoder(&self) -> broadcast::Receiver<EncoderMessage> {
        self.publisher.subscribe_encoder()
    }

    /// Configured IMU topic name
    pub fn imu_topic(&self) -> &str {
        self.publisher.imu_topic()
    }

    /// Configured encoder topic name
    pub fn encoder_topic(&self) -> &str {
        self.publisher.encoder_topic()
    }

    async fn request<T>(
        &self,
        cmd: NodeCommand,
        rx: tokio::sync::oneshot::Receiver<T>,
    ) -> GimbalResult<T> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| GimbalError::NodeStopped)?;
        rx.await.map_err(|_| GimbalError::NodeStopped)
    }
}
