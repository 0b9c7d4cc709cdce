//! Configuration change detection.
//!
//! A [`ChangeWatcher`] observes the active source and emits one signal per
//! detected change; [`ConfigManager::watch`](crate::core::ConfigManager::watch)
//! turns each signal into a reload followed by the caller's notification.

mod poller;
mod watcher;

pub use poller::{DEFAULT_POLL_INTERVAL, RemoteConfigWatcher};
pub use watcher::{DEFAULT_DEBOUNCE, LocalConfigWatcher};

use crate::error::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Change detection for the active source, selected once at construction.
pub enum ChangeWatcher {
    /// Filesystem notifications on the local file
    Local(LocalConfigWatcher),
    /// Interval polling of the remote source
    Remote(RemoteConfigWatcher),
}

impl ChangeWatcher {
    /// Register a subscription that sends `()` on `changes` for every change
    /// until `token` is cancelled. Returns without blocking.
    pub fn watch(&self, token: CancellationToken, changes: mpsc::Sender<()>) -> Result<()> {
        match self {
            Self::Local(watcher) => watcher.watch(token, changes),
            Self::Remote(watcher) => watcher.watch(token, changes),
        }
    }
}
