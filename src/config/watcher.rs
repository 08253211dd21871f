//! Configuration file watcher for hot reload.

use arc_swap::ArcSwap;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::read_document;

/// Watches the configuration file and swaps in the re-parsed document on
/// every modification. A document that fails to parse is logged and the
/// previous one is kept.
///
/// The parent directory is watched rather than the file, so replacing the
/// file by rename keeps reloads flowing.
pub struct ConfigWatcher {
    path: PathBuf,
    root: Arc<ArcSwap<Value>>,
}

impl ConfigWatcher {
    /// Creates a watcher publishing into `root`.
    pub fn new(path: &Path, root: Arc<ArcSwap<Value>>) -> Self {
        Self {
            path: path.to_path_buf(),
            root,
        }
    }

    /// Starts watching. The returned watcher stops when dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let root = self.root;
        let file_name = self.path.file_name().map(|name| name.to_os_string());
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                    if touches_file && (event.kind.is_modify() || event.kind.is_create()) {
                        match read_document(&path) {
                            Ok(document) => {
                                root.store(Arc::new(document));
                                tracing::info!(path = %path.display(), "Config file change detected, reloaded");
                            }
                            Err(e) => {
                                tracing::error!(
                                    path = %path.display(),
                                    error = %e,
                                    "Failed to reload config, keeping current configuration"
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}
