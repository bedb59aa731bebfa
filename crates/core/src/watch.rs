//! Resync trigger for store files edited outside the process.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Watches the store file and requests resyncs.
///
/// Requests are coalesced: while one is waiting to be handled, further
/// changes are dropped.
pub struct StoreWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl StoreWatcher {
    /// Start watching `path`'s directory. The receiver yields one `()` per
    /// pending resync.
    pub fn spawn(path: impl Into<PathBuf>) -> Result<(Self, mpsc::Receiver<()>)> {
        let path = path.into();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create store directory {}", dir.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .with_context(|| format!("store path {} has no file name", path.display()))?;

        let (tx, rx) = mpsc::channel(1);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_store_event(&event, &file_name) => {
                if tx.try_send(()).is_ok() {
                    debug!(kind = ?event.kind, "Store file changed");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(?err, "Store watcher error"),
        })
        .context("failed to create store watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;

        info!(path = %path.display(), "Watching recipe store");
        Ok((
            Self {
                _watcher: watcher,
                path,
            },
            rx,
        ))
    }

    /// Watched store file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_store_event(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}
