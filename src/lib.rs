//! Core library for the gimbal node.
//!
//! Orchestrates a motorized camera gimbal behind a serial protocol engine:
//! brings it to a powered, configured state, relays inertial and encoder
//! telemetry to subscribers, and forwards pointing goals. The protocol engine
//! itself is external and plugs in through [`gimbal::GimbalSession`].
//!
//! # Example
//!
//! ```no_run
//! use gimbal_node::config::OperatingConfig;
//! use gimbal_node::gimbal::mock::SimulatedGimbal;
//! use gimbal_node::messages::GoalCommand;
//! use gimbal_node::node::GimbalNode;
//! use gimbal_node::startup::StartupOptions;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = Arc::new(SimulatedGimbal::new());
//!     let (mut node, handle) = GimbalNode::new(session, OperatingConfig::load()?);
//!
//!     node.startup(StartupOptions::default()).await?;
//!     let task = tokio::spawn(node.run());
//!
//!     let mut imu = handle.subscribe_imu();
//!     handle.send_goal(GoalCommand::new(0.0, 10.0, 45.0)).await?;
//!     println!("{:?}", imu.recv().await?);
//!
//!     handle.shutdown().await?;
//!     task.await??;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conversions;
pub mod error;
pub mod forwarder;
pub mod gimbal;
pub mod messages;
pub mod node;
pub mod startup;
pub mod telemetry;

pub use error::{GimbalError, GimbalResult};
pub use node::{GimbalNode, GimbalNodeHandle};
