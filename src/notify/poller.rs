//! Interval polling of remote configuration sources.

use crate::error::{ConfigError, Result};
use crate::sources::{DEFAULT_REMOTE_TIMEOUT, RemoteFetcher, RemoteProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default interval between remote checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polls a remote source and emits a signal after every successful check.
///
/// Failed checks are logged and retried on the next tick; they never end
/// the loop. Only cancellation does. Each check runs under a deadline, so a
/// hung fetcher costs one tick rather than the whole loop.
pub struct RemoteConfigWatcher {
    descriptor: Arc<RemoteProvider>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
    poll_interval: Duration,
    check_timeout: Duration,
    shutdown: CancellationToken,
}

impl RemoteConfigWatcher {
    /// Create a poller for `descriptor`.
    pub fn new(
        descriptor: Arc<RemoteProvider>,
        fetcher: Option<Arc<dyn RemoteFetcher>>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            fetcher,
            poll_interval,
            check_timeout: DEFAULT_REMOTE_TIMEOUT,
            shutdown,
        }
    }

    /// Set the deadline for a single check. Default is 30 seconds.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// The interval between checks.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start the polling loop on a background task and return immediately.
    ///
    /// The first check happens one interval after the call.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnsupportedRemote`] if no fetcher exists for the descriptor
    /// - [`ConfigError::WatchSetupFailed`] for a zero interval or a missing runtime
    pub fn watch(&self, token: CancellationToken, changes: mpsc::Sender<()>) -> Result<()> {
        let fetcher = self.fetcher.clone().ok_or_else(|| {
            ConfigError::UnsupportedRemote(self.descriptor.provider_type.clone())
        })?;
        if self.poll_interval.is_zero() {
            return Err(ConfigError::WatchSetupFailed(
                "poll interval must be non-zero".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ConfigError::WatchSetupFailed("no Tokio runtime available".to_string()))?;

        let descriptor = Arc::clone(&self.descriptor);
        let poll_interval = self.poll_interval;
        let check_timeout = self.check_timeout;
        let shutdown = self.shutdown.clone();

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let checked = tokio::time::timeout(check_timeout, fetcher.check(&descriptor))
                            .await
                            .unwrap_or(Err(ConfigError::Timeout));
                        if let Err(e) = checked {
                            tracing::warn!(
                                endpoint = %descriptor.endpoint,
                                error = %e,
                                backoff = ?poll_interval,
                                "Error watching remote config"
                            );
                            continue;
                        }
                        tracing::debug!(endpoint = %descriptor.endpoint, "Remote configuration check completed");
                        if changes.send(()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(endpoint = %descriptor.endpoint, "Remote configuration watcher stopped");
        });

        Ok(())
    }
}
