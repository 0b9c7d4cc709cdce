//! File watching for automatic configuration reloads.

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default window in which bursts of filesystem events collapse into one change.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the local configuration file and emits one signal per change.
///
/// The file's parent directory is watched non-recursively and events are
/// filtered by file name, so editors that replace the file atomically are
/// still observed. Bursts of events within the debounce window produce a
/// single signal.
///
/// # Examples
///
/// ```rust,no_run
/// use strata_config::notify::LocalConfigWatcher;
/// use tokio_util::sync::CancellationToken;
/// use std::time::Duration;
///
/// # async fn example() -> strata_config::error::Result<()> {
/// let watcher = LocalConfigWatcher::new(
///     "/path/to/config.yaml",
///     Duration::from_millis(100),
///     CancellationToken::new(),
/// );
/// let (tx, mut rx) = tokio::sync::mpsc::channel(16);
/// watcher.watch(CancellationToken::new(), tx)?;
///
/// while let Some(()) = rx.recv().await {
///     println!("Config file changed");
/// }
/// # Ok(())
/// # }
/// ```
pub struct LocalConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    shutdown: CancellationToken,
}

impl LocalConfigWatcher {
    /// Create a watcher for `path`.
    ///
    /// `shutdown` stops every subscription started by this watcher.
    pub fn new(path: impl Into<PathBuf>, debounce: Duration, shutdown: CancellationToken) -> Self {
        Self {
            path: path.into(),
            debounce,
            shutdown,
        }
    }

    /// The watched file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The debounce window.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Register a subscription and return immediately.
    ///
    /// A background task forwards one `()` per detected change to `changes`
    /// until `token` or the shutdown token fires, or the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WatchSetupFailed`] if the path has no file name,
    /// its directory cannot be watched, or no Tokio runtime is running.
    #[cfg(feature = "file-watch")]
    pub fn watch(&self, token: CancellationToken, changes: mpsc::Sender<()>) -> Result<()> {
        use notify::{Event, EventKind, RecursiveMode, Watcher as _};

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ConfigError::WatchSetupFailed("no Tokio runtime available".to_string()))?;

        let target = std::path::absolute(&self.path).map_err(|e| {
            ConfigError::WatchSetupFailed(format!("Failed to resolve path: {}", e))
        })?;
        let file_name = target
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| {
                ConfigError::WatchSetupFailed(format!(
                    "Not a file path: {}",
                    self.path.display()
                ))
            })?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                // Only care about write/create events for our file
                let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if relevant {
                    let _ = event_tx.send(());
                }
            }
        })
        .map_err(|e| ConfigError::WatchSetupFailed(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::WatchSetupFailed(format!("Failed to watch path: {}", e)))?;

        let debounce = self.debounce;
        let shutdown = self.shutdown.clone();
        runtime.spawn(async move {
            // The notify watcher stops delivering events once dropped.
            let _watcher = watcher;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    event = event_rx.recv() => {
                        if event.is_none() {
                            break;
                        }
                        if !debounce.is_zero() {
                            tokio::time::sleep(debounce).await;
                            while event_rx.try_recv().is_ok() {}
                        }
                        if token.is_cancelled() || shutdown.is_cancelled() {
                            break;
                        }
                        tracing::info!(file = %target.display(), "Local configuration changed");
                        if changes.send(()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(file = %target.display(), "Local configuration watcher stopped");
        });

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(())
    }

    /// File watching is compiled out; always fails.
    #[cfg(not(feature = "file-watch"))]
    pub fn watch(&self, _token: CancellationToken, _changes: mpsc::Sender<()>) -> Result<()> {
        Err(ConfigError::FeatureNotEnabled("file-watch"))
    }
}
