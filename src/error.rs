//! Custom error types for the gimbal node.
//!
//! This module defines the primary error type, `GimbalError`, used across the
//! crate. Built on `thiserror`, it separates the failure classes that the node
//! treats differently:
//!
//! - **`Transport`**: an I/O failure talking to the gimbal session. Fatal during
//!   startup; during steady state the single affected read or command is
//!   skipped and the loop continues.
//! - **`Configuration`**: an option outside its recognized range, detected when
//!   it is translated into a vendor command, or a config file that fails
//!   validation.
//! - **`ProtocolHang`**: the startup power-on wait gave up because the opt-in
//!   timeout elapsed before the gimbal reported ON.
//! - **`Cancelled`**: the startup wait was cancelled by the caller.
//! - **`ConfigLoad`**: wraps `figment` errors raised while reading the config
//!   file or environment.
//! - **`Watch`**: wraps `notify` errors from the config file watcher.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type GimbalResult<T> = std::result::Result<T, GimbalError>;

/// Errors raised by the gimbal node
#[derive(Error, Debug)]
pub enum GimbalError {
    /// I/O failure talking to the gimbal session
    #[error("Transport error: {0}")]
    Transport(String),

    /// Option out of range or failing validation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Startup timeout elapsed before the gimbal reported ON
    #[error("Gimbal did not report ON after {waited:?}")]
    ProtocolHang {
        /// Time spent in startup before giving up
        waited: Duration,
    },

    /// Startup cancelled by the caller
    #[error("Startup cancelled before the gimbal reported ON")]
    Cancelled,

    /// Config file or environment could not be read
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    /// Config file watcher failure
    #[error("Config watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// The node event loop has exited
    #[error("Gimbal node is not running")]
    NodeStopped,
}

impl GimbalError {
    /// Shorthand for a transport failure with a formatted message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// True for failures that only affect a single steady-state operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<figment::Error> for GimbalError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}
