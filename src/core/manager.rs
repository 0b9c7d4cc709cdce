//! The configuration manager facade.

use crate::core::{Coerce, ConfigManagerBuilder, SettingsStore, Table};
use crate::error::{ConfigError, Result};
use crate::notify::ChangeWatcher;
use crate::sources::{LoadTarget, SourceProvider};
use chrono::{DateTime, Utc};
use config::Value;
use parking_lot::RwLockReadGuard;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// What a watch subscription does when the reload triggered by a change fails.
///
/// The failure is always logged. With [`NotifyOnFailure`](Self::NotifyOnFailure)
/// the caller is still notified and reads last-known-good data; with
/// [`SkipOnFailure`](Self::SkipOnFailure) the notification is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    /// Notify even if the reload failed
    #[default]
    NotifyOnFailure,
    /// Notify only after a successful reload
    SkipOnFailure,
}

/// Layered configuration with typed accessors and live reload.
///
/// Resolves settings from defaults, one source (a local file or a remote
/// service) and environment variables, with precedence
/// `environment > source > defaults`. Reads are safe from any number of
/// threads while a load runs; a load publishes its result atomically, so
/// readers see either the previous or the new settings, never a mix.
///
/// Handles are cheap to clone and share all state.
///
/// # Examples
///
/// ```rust,no_run
/// use strata_config::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let config = ConfigManager::builder()
///     .with_file("config.yaml")
///     .with_env_prefix("SYNX")
///     .with_default("server.port", 8080)
///     .build()?;
///
/// config.load().await?;
/// println!("Port: {}", config.get_int("server.port"));
/// # Ok(())
/// # }
/// ```
pub struct ConfigManager<S = ()> {
    /// Store and schema slot the provider publishes into
    target: Arc<LoadTarget<S>>,
    /// The active source
    provider: Arc<SourceProvider>,
    /// Change detection for the active source, if watching is available
    watcher: Option<Arc<ChangeWatcher>>,
    reload_policy: ReloadPolicy,
    /// Serializes loads so commits land in call order
    reload_lock: Arc<Mutex<()>>,
    closed: Arc<AtomicBool>,
    /// Cancelled on close; stops every watch task
    done: CancellationToken,
}

impl ConfigManager<()> {
    /// Create a new builder for constructing a configuration manager.
    pub fn builder() -> ConfigManagerBuilder {
        ConfigManagerBuilder::new()
    }
}

impl<S> ConfigManager<S> {
    pub(crate) fn from_parts(
        target: LoadTarget<S>,
        provider: SourceProvider,
        watcher: Option<ChangeWatcher>,
        reload_policy: ReloadPolicy,
        done: CancellationToken,
    ) -> Self {
        Self {
            target: Arc::new(target),
            provider: Arc::new(provider),
            watcher: watcher.map(Arc::new),
            reload_policy,
            reload_lock: Arc::new(Mutex::new(())),
            closed: Arc::new(AtomicBool::new(false)),
            done,
        }
    }

    fn store(&self) -> RwLockReadGuard<'_, SettingsStore> {
        self.target.store().read()
    }

    /// Returns the effective value for `key`, if any layer sets it.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store().get(key)
    }

    /// Returns a string value, or `""` if absent or not coercible.
    pub fn get_string(&self, key: &str) -> String {
        self.store().get_as(key)
    }

    /// Returns an integer value, or `0` if absent or not coercible.
    pub fn get_int(&self, key: &str) -> i64 {
        self.store().get_as(key)
    }

    /// Returns a float value, or `0.0` if absent or not coercible.
    pub fn get_float(&self, key: &str) -> f64 {
        self.store().get_as(key)
    }

    /// Returns a boolean value, or `false` if absent or not coercible.
    pub fn get_bool(&self, key: &str) -> bool {
        self.store().get_as(key)
    }

    /// Returns a list of strings, or an empty list.
    pub fn get_string_slice(&self, key: &str) -> Vec<String> {
        self.store().get_as(key)
    }

    /// Returns a nested table, or an empty one.
    pub fn get_string_map(&self, key: &str) -> Table {
        self.store().get_as(key)
    }

    /// Returns a duration (`"30s"`, `"1m30s"`), or zero.
    pub fn get_duration(&self, key: &str) -> Duration {
        self.store().get_as(key)
    }

    /// Returns a timestamp, or the Unix epoch.
    pub fn get_time(&self, key: &str) -> DateTime<Utc> {
        self.store().get_as(key)
    }

    /// Returns the value for `key` coerced into `T`, or `None`.
    ///
    /// Unlike the `get_*` accessors this distinguishes "absent or mismatched"
    /// from a configured zero value.
    pub fn lookup<T: Coerce>(&self, key: &str) -> Option<T> {
        self.store().lookup_as(key)
    }

    /// Deserializes the value for `key` into `T`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::KeyNotFound`] if no layer sets `key`
    /// - [`ConfigError::DeserializationError`] if the value does not fit `T`
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
        value
            .try_deserialize()
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", key, e)))
    }

    /// Returns `true` if any layer, including defaults, sets `key`.
    pub fn is_set(&self, key: &str) -> bool {
        self.store().is_set(key)
    }

    /// All known leaf keys.
    pub fn all_keys(&self) -> Vec<String> {
        self.store().all_keys()
    }

    /// A nested snapshot of every effective setting.
    pub fn all_settings(&self) -> Table {
        self.store().all_settings()
    }

    /// The schema bound by the last successful load.
    ///
    /// `None` if no schema is configured or nothing has loaded yet.
    pub fn get_schema(&self) -> Option<Arc<S>> {
        self.target.schema()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the manager: later loads and watches fail with
    /// [`ConfigError::Closed`] and running watch tasks stop.
    ///
    /// Idempotent; every call succeeds.
    pub fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.done.cancel();
            tracing::debug!(source = %self.provider.name(), "Config manager closed");
        }
        Ok(())
    }
}

impl<S> ConfigManager<S>
where
    S: Send + Sync + 'static,
{
    /// Reload from the active source.
    ///
    /// Runs the full sequence: reset, defaults, source, environment overlay,
    /// schema binding. The result is published only if every step succeeds;
    /// otherwise the previous settings and schema stay in place.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Closed`] after [`close`](Self::close)
    /// - otherwise the provider's error, unchanged
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use strata_config::prelude::*;
    /// # async fn example(config: ConfigManager) -> Result<()> {
    /// config.load().await?;
    /// println!("Reloaded config, port: {}", config.get_int("server.port"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ConfigError::Closed);
        }
        let _guard = self.reload_lock.lock().await;
        if self.is_closed() {
            return Err(ConfigError::Closed);
        }
        self.provider.load(&self.target).await
    }

    /// Watch the active source and call `on_change` after every change.
    ///
    /// Returns as soon as the subscription is registered. Each detected
    /// change reloads the configuration first, then calls `on_change`; a
    /// failed reload is logged and handled according to the
    /// [`ReloadPolicy`]. The subscription ends when `token` is cancelled or
    /// the manager is closed. Multiple subscriptions may run at once; none
    /// receives an initial callback.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Closed`] after [`close`](Self::close)
    /// - [`ConfigError::WatchSetupFailed`] if `token` is already cancelled,
    ///   watching is not enabled for a remote source, or registration fails
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use strata_config::prelude::*;
    /// # use tokio_util::sync::CancellationToken;
    /// # fn example(config: ConfigManager) -> Result<()> {
    /// let token = CancellationToken::new();
    /// let handle = config.clone();
    /// config.watch(token.clone(), move || {
    ///     println!("New port: {}", handle.get_int("server.port"));
    /// })?;
    ///
    /// // Later, stop watching
    /// token.cancel();
    /// # Ok(())
    /// # }
    /// ```
    pub fn watch<F>(&self, token: CancellationToken, on_change: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(ConfigError::Closed);
        }
        if token.is_cancelled() {
            return Err(ConfigError::WatchSetupFailed(
                "cancellation token is already cancelled".to_string(),
            ));
        }
        let watcher = self.watcher.as_ref().ok_or_else(|| {
            ConfigError::WatchSetupFailed("watching is not enabled for this source".to_string())
        })?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ConfigError::WatchSetupFailed("no Tokio runtime available".to_string()))?;

        let (tx, mut rx) = mpsc::channel(16);
        watcher.watch(token.clone(), tx)?;

        let manager = self.clone();
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = manager.done.cancelled() => break,
                    signal = rx.recv() => match signal {
                        Some(()) => manager.reload_and_notify(&on_change).await,
                        None => break,
                    },
                }
            }
        });

        Ok(())
    }

    async fn reload_and_notify<F: Fn()>(&self, on_change: &F) {
        match self.load().await {
            Ok(()) => on_change(),
            Err(ConfigError::Closed) => {}
            Err(e) => {
                tracing::error!(
                    source = %self.provider.name(),
                    error = %e,
                    "Failed to reload configuration"
                );
                if self.reload_policy == ReloadPolicy::NotifyOnFailure {
                    on_change();
                }
            }
        }
    }
}

impl<S> Clone for ConfigManager<S> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
            provider: Arc::clone(&self.provider),
            watcher: self.watcher.clone(),
            reload_policy: self.reload_policy,
            reload_lock: Arc::clone(&self.reload_lock),
            closed: Arc::clone(&self.closed),
            done: self.done.clone(),
        }
    }
}
