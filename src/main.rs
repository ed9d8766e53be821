//! gimbal_node binary
//!
//! Loads the operating configuration, brings the gimbal up, then relays
//! telemetry and goals until Ctrl-C. The serial protocol engine is provided
//! by crates implementing `GimbalSession`; this binary runs against the
//! simulated gimbal so the whole pipeline can be exercised without hardware.
//!
//! ```bash
//! RUST_LOG=gimbal_node=debug cargo run -- --config config/gimbal.toml --goals-from-stdin
//! ```
//!
//! With `--goals-from-stdin`, each line of three numbers (`x y z`) is sent as
//! a pointing goal.

use anyhow::{Context, Result};
use clap::Parser;
use gimbal_node::config::{ConfigWatcher, OperatingConfig, DEFAULT_CONFIG_PATH};
use gimbal_node::gimbal::mock::SimulatedGimbal;
use gimbal_node::messages::GoalCommand;
use gimbal_node::node::{GimbalNode, GimbalNodeHandle};
use gimbal_node::startup::StartupOptions;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Gimbal bring-up, telemetry relay and goal forwarding")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Give up if the gimbal has not reported ON within this many milliseconds
    /// (default: wait forever)
    #[arg(long)]
    startup_timeout_ms: Option<u64>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Do not reload the configuration file when it changes
    #[arg(long)]
    no_watch: bool,

    /// Read goals (`x y z` per line) from stdin
    #[arg(long)]
    goals_from_stdin: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = OperatingConfig::load_from(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    info!(
        "Starting gimbal node on {} @ {} baud (simulated session)",
        config.device, config.baudrate
    );

    let session = Arc::new(SimulatedGimbal::new());
    let (mut node, handle) = GimbalNode::new(session, config);

    if !args.no_watch {
        match ConfigWatcher::start(&args.config) {
            Ok((watcher, updates)) => node = node.with_config_watcher(watcher, updates),
            Err(e) => warn!("Config hot reload disabled: {}", e),
        }
    }

    // Ctrl-C cancels a pending startup and later stops the node
    let mut stop_rx = spawn_stop_signal(tokio::signal::ctrl_c());

    let mut options = StartupOptions::default().with_cancel(stop_rx.clone());
    if let Some(ms) = args.startup_timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }

    if let Err(e) = node.startup(options).await {
        error!("Gimbal startup failed: {}", e);
        return Err(e).context("Gimbal startup failed");
    }

    spawn_telemetry_logger(&handle);
    if args.goals_from_stdin {
        spawn_stdin_goals(handle.clone());
    }

    let mut node_task = tokio::spawn(node.run());

    tokio::select! {
        result = &mut node_task => {
            result.context("Node task panicked")??;
            warn!("Gimbal node stopped on its own");
            return Ok(());
        }
        _ = wait_for_stop(&mut stop_rx) => {}
    }

    handle.shutdown().await?;
    node_task.await.context("Node task panicked")??;
    info!("Gimbal node exited");
    Ok(())
}

async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    while !*stop_rx.borrow_and_update() {
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Flip the returned flag to `true` once `signal` fires
///
/// If the signal cannot be installed the flag never changes and the node
/// runs until it is killed.
fn spawn_stop_signal<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("Ctrl-C received");
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                warn!("Cannot listen for Ctrl-C, stop the process externally: {}", e);
                // Dropping the sender would read as a stop request
                std::future::pending::<()>().await;
                drop(stop_tx);
            }
        }
    });
    stop_rx
}

fn spawn_telemetry_logger(handle: &GimbalNodeHandle) {
    let mut imu_rx = handle.subscribe_imu();
    let imu_topic = handle.imu_topic().to_string();
    tokio::spawn(async move {
        while let Ok(msg) = imu_rx.recv().await {
            debug!("{}: {:?}", imu_topic, msg);
        }
    });

    let mut encoder_rx = handle.subscribe_encoder();
    let encoder_topic = handle.encoder_topic().to_string();
    tokio::spawn(async move {
        while let Ok(msg) = encoder_rx.recv().await {
            debug!("{}: {:?}", encoder_topic, msg);
        }
    });
}

fn spawn_stdin_goals(handle: GimbalNodeHandle) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_goal(&line) {
                Some(goal) => {
                    if handle.send_goal(goal).await.is_err() {
                        break;
                    }
                }
                None => warn!("Ignoring malformed goal line: {:?}", line),
            }
        }
    });
}

fn parse_goal(line: &str) -> Option<GoalCommand> {
    let values: Vec<f64> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match values.as_slice() {
        [x, y, z] => Some(GoalCommand::new(*x, *y, *z)),
        _ => None,
    }
}
