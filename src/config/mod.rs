//! Configuration management
//!
//! - [`OperatingConfig`]: the operating parameters, loaded with Figment from
//!   defaults, a TOML file and `GIMBAL_` environment variables.
//! - [`ConfigStore`]: the single live configuration, replaced wholesale on
//!   reconfiguration.
//! - [`ConfigWatcher`]: hot reload of the config file for the lifetime of the
//!   process.
//!
//! # Example
//!
//! ```no_run
//! use gimbal_node::config::{ConfigStore, OperatingConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OperatingConfig::load_from("config/gimbal.toml")?;
//!     let store = ConfigStore::new(config);
//!     println!("Poll rate: {} Hz", store.current().state_poll_rate);
//!     Ok(())
//! }
//! ```

pub mod operating_config;
pub mod store;
pub mod watcher;

pub use operating_config::{OperatingConfig, DEFAULT_CONFIG_PATH, ENV_PREFIX};
pub use store::ConfigStore;
pub use watcher::ConfigWatcher;
