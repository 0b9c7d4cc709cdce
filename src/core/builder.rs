//! Builder for constructing ConfigManager instances.

use crate::core::{ConfigManager, ReloadPolicy, SchemaBinder};
use crate::error::Result;
use crate::notify::{
    ChangeWatcher, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL, LocalConfigWatcher,
    RemoteConfigWatcher,
};
use crate::sources::{
    DEFAULT_REMOTE_TIMEOUT, LoadTarget, LocalConfigProvider, RemoteConfigProvider, RemoteFetcher,
    RemoteProvider, SourceLayers, SourceProvider, resolve_fetcher,
};
use config::Value;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use validator::Validate;

/// Builder for constructing a [`ConfigManager`].
///
/// Every option is optional. A remote provider, when given, replaces the
/// local file as the active source.
///
/// # Examples
///
/// ```rust,no_run
/// use strata_config::prelude::*;
/// use serde::Deserialize;
/// use validator::Validate;
///
/// #[derive(Debug, Deserialize, Validate)]
/// struct AppConfig {
///     #[validate(nested)]
///     server: ServerConfig,
/// }
///
/// #[derive(Debug, Deserialize, Validate)]
/// struct ServerConfig {
///     #[validate(range(min = 1024, max = 65535))]
///     port: u16,
/// }
///
/// # async fn example() -> Result<()> {
/// let config = ConfigManager::builder()
///     .with_file("config/default.yaml")
///     .with_env_prefix("APP")
///     .with_default("server.port", 8080)
///     .with_schema::<AppConfig>()
///     .build()?;
///
/// config.load().await?;
/// let schema = config.get_schema().expect("loaded");
/// println!("Port: {}", schema.server.port);
/// # Ok(())
/// # }
/// ```
pub struct ConfigManagerBuilder<S = ()> {
    path: PathBuf,
    binder: Option<SchemaBinder<S>>,
    env_prefix: Option<String>,
    defaults: HashMap<String, Value>,
    remote: Option<RemoteProvider>,
    remote_fetcher: Option<Arc<dyn RemoteFetcher>>,
    remote_timeout: Duration,
    watch_enabled: bool,
    poll_interval: Duration,
    debounce: Duration,
    reload_policy: ReloadPolicy,
}

impl ConfigManagerBuilder<()> {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            binder: None,
            env_prefix: None,
            defaults: HashMap::new(),
            remote: None,
            remote_fetcher: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            watch_enabled: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            reload_policy: ReloadPolicy::default(),
        }
    }
}

impl Default for ConfigManagerBuilder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ConfigManagerBuilder<S> {
    /// Set the configuration file.
    ///
    /// Supported formats: YAML (.yaml, .yml), TOML (.toml), JSON (.json)
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Bind every load into schema type `T` and validate it.
    ///
    /// A load whose settings fail to decode or validate is rejected and
    /// nothing is published.
    pub fn with_schema<T>(self) -> ConfigManagerBuilder<T>
    where
        T: DeserializeOwned + Validate,
    {
        ConfigManagerBuilder {
            path: self.path,
            binder: Some(SchemaBinder::new()),
            env_prefix: self.env_prefix,
            defaults: self.defaults,
            remote: self.remote,
            remote_fetcher: self.remote_fetcher,
            remote_timeout: self.remote_timeout,
            watch_enabled: self.watch_enabled,
            poll_interval: self.poll_interval,
            debounce: self.debounce,
            reload_policy: self.reload_policy,
        }
    }

    /// Enable environment overrides with the given prefix.
    ///
    /// ```rust,no_run
    /// use strata_config::prelude::*;
    ///
    /// // APP_SERVER_PORT=9000 -> server.port = 9000
    /// ConfigManager::builder().with_env_prefix("APP");
    /// ```
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Register a default value for a dotted key.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Register several default values.
    pub fn with_defaults<K, V, I>(mut self, defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.defaults
            .extend(defaults.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Load from a remote service instead of the local file.
    pub fn with_remote_provider(mut self, provider: RemoteProvider) -> Self {
        self.remote = Some(provider);
        self
    }

    /// Use a custom fetcher for the remote provider, whatever its type.
    pub fn with_remote_fetcher<F: RemoteFetcher + 'static>(mut self, fetcher: F) -> Self {
        self.remote_fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Deadline for a remote load and for each watch check. Default is
    /// 30 seconds.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Enable watching of a remote source. Local files can always be watched.
    pub fn with_watcher(mut self, enabled: bool) -> Self {
        self.watch_enabled = enabled;
        self
    }

    /// Interval between remote checks while watching. Default is 10 seconds.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Window in which bursts of file events collapse into one change.
    /// Default is 100 milliseconds.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// How watch subscriptions react to a failed reload.
    pub fn with_reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.reload_policy = policy;
        self
    }

    /// Build the manager. Nothing is read until [`ConfigManager::load`].
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in HTTP fetcher cannot be constructed,
    /// or [`ConfigError::FeatureNotEnabled`](crate::error::ConfigError::FeatureNotEnabled)
    /// for an `http` provider without the `remote` feature.
    pub fn build(self) -> Result<ConfigManager<S>> {
        let layers = SourceLayers::new(self.defaults, self.env_prefix);
        let done = CancellationToken::new();

        let (provider, watcher) = match self.remote {
            Some(descriptor) => {
                let descriptor = Arc::new(descriptor);
                let fetcher = resolve_fetcher(&descriptor, self.remote_fetcher)?;
                let watcher = self.watch_enabled.then(|| {
                    ChangeWatcher::Remote(RemoteConfigWatcher::new(
                        Arc::clone(&descriptor),
                        fetcher.clone(),
                        self.poll_interval,
                        done.clone(),
                    )
                    .with_check_timeout(self.remote_timeout))
                });
                let provider = RemoteConfigProvider::new(descriptor, fetcher, layers)
                    .with_timeout(self.remote_timeout);
                (SourceProvider::Remote(provider), watcher)
            }
            None => {
                let watcher = ChangeWatcher::Local(LocalConfigWatcher::new(
                    self.path.clone(),
                    self.debounce,
                    done.clone(),
                ));
                let provider = LocalConfigProvider::new(self.path, layers);
                (SourceProvider::Local(provider), Some(watcher))
            }
        };

        tracing::debug!(source = %provider.name(), "Config manager built");

        Ok(ConfigManager::from_parts(
            LoadTarget::new(self.binder),
            provider,
            watcher,
            self.reload_policy,
            done,
        ))
    }
}
