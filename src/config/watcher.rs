//! Hot reload of the router config file.
//!
//! The parent directory is watched rather than the file itself: editors and
//! config-management tools usually replace the file through a rename, which
//! would orphan a watch on the old inode.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::RouterConfig;

pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RouterConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver of successfully reloaded configs.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RouterConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let path = self.path.clone();
        let tx = self.update_tx;
        // Content of the last config sent, to skip no-op rewrites.
        let last = Mutex::new(std::fs::read_to_string(&path).ok());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_relevant(&event, &path) => {
                    let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
                    match reload(&path, last.as_deref()) {
                        Ok(Some((content, config))) => {
                            tracing::info!(path = ?path, "Config file changed, reloaded");
                            *last = Some(content);
                            let _ = tx.send(config);
                        }
                        Ok(None) => tracing::debug!(path = ?path, "Config file touched without changes"),
                        Err(e) => tracing::error!(
                            path = ?path,
                            error = %e,
                            "Failed to reload config, keeping current configuration"
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");

        Ok(watcher)
    }
}

/// True for create/modify events that touch the config file.
fn is_relevant(event: &Event, path: &Path) -> bool {
    let kind = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    let name = path.file_name();
    kind && event.paths.iter().any(|p| p.file_name() == name)
}

/// Read and validate the file. `Ok(None)` when the content is unchanged.
fn reload(path: &Path, last: Option<&str>) -> Result<Option<(String, RouterConfig)>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    if last == Some(content.as_str()) {
        return Ok(None);
    }
    let config = parse_config(&content)?;
    Ok(Some((content, config)))
}
