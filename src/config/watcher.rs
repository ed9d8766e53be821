//! Config file hot reload
//!
//! Watches the directory holding the config file and re-parses the file on
//! every change to it. Successfully parsed configurations are delivered on an
//! unbounded channel; parse failures and empty (mid-write) files are skipped
//! and the old configuration stays live. The watcher stops delivering when the [`ConfigWatcher`] is
//! dropped, so the owner must keep it for as long as updates are wanted.

use super::OperatingConfig;
use crate::error::{GimbalError, GimbalResult};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Guard for a running config file watch
pub struct ConfigWatcher {
    path: PathBuf,
    // Dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `path`
    ///
    /// Returns the watcher guard and the receiving end of the update channel.
    pub fn start<P: AsRef<Path>>(
        path: P,
    ) -> GimbalResult<(Self, mpsc::UnboundedReceiver<OperatingConfig>)> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .ok_or_else(|| {
                GimbalError::Configuration(format!(
                    "Config path has no file name: {}",
                    path.display()
                ))
            })?
            .to_os_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let reload_path = path.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("Config watcher error: {}", e);
                    return;
                }
            };

            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            if !event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()))
            {
                return;
            }

            if let Some(config) = reload(&reload_path) {
                if tx.send(config).is_err() {
                    warn!("Config update receiver dropped");
                }
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!("Watching {} for configuration changes", path.display());

        Ok((
            Self {
                path,
                _watcher: watcher,
            },
            rx,
        ))
    }

    /// Watched config file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Re-read the config file after a change event
///
/// Writers usually truncate before writing, so an empty document is a
/// transient state and is skipped instead of being read as all defaults.
fn reload(path: &Path) -> Option<OperatingConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => {
            debug!("Skipping empty config file {}", path.display());
            return None;
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Cannot read config update from {}: {}", path.display(), e);
            return None;
        }
    }

    match OperatingConfig::load_from(path) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Ignoring invalid config update from {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    #[tokio::test]
    #[serial]
    async fn test_file_change_delivers_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gimbal.toml");
        std::fs::write(&path, "gimbal_mode = 1\n").unwrap();

        let (_watcher, mut rx) = ConfigWatcher::start(&path).unwrap();

        std::fs::write(&path, "gimbal_mode = 2\nstate_poll_rate = 5.0\n").unwrap();

        let update = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(config) if config.gimbal_mode == 2 => return Some(config),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .expect("no config update within 5s")
        .expect("update channel closed");

        assert_eq!(update.state_poll_rate, 5.0);
    }

    #[test]
    #[serial]
    fn test_reload_skips_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gimbal.toml");

        std::fs::write(&path, "").unwrap();
        assert!(reload(&path).is_none());
        std::fs::write(&path, "  \n\n").unwrap();
        assert!(reload(&path).is_none());
    }

    #[test]
    #[serial]
    fn test_reload_skips_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gimbal.toml");

        std::fs::write(&path, "state_poll_rate = 0.0\n").unwrap();
        assert!(reload(&path).is_none());
        std::fs::write(&path, "gimbal_mode = \n").unwrap();
        assert!(reload(&path).is_none());
        assert!(reload(&dir.path().join("missing.toml")).is_none());
    }

    #[test]
    #[serial]
    fn test_reload_parses_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gimbal.toml");

        std::fs::write(&path, "gimbal_mode = 2\n").unwrap();
        assert_eq!(reload(&path).unwrap().gimbal_mode, 2);
    }

    #[test]
    fn test_path_without_file_name_rejected() {
        assert!(ConfigWatcher::start("/").is_err());
    }
}
