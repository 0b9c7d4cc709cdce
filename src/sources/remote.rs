//! Remote configuration sources.

use super::{LoadTarget, SourceLayers};
use crate::core::store::{Table, table_value};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use config::{Value, ValueKind};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for a remote load.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Identifies an external configuration source.
///
/// `provider_type` selects the backing system (e.g. `http`, `consul`),
/// `endpoint` its network address and `path` the configuration's logical
/// location within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProvider {
    /// Backing system, e.g. `"http"`
    pub provider_type: String,
    /// Network address, e.g. `"localhost:8500"`
    pub endpoint: String,
    /// Logical location, e.g. `"/myapp/config"`
    pub path: String,
}

impl RemoteProvider {
    /// Create a new remote descriptor.
    pub fn new(
        provider_type: impl Into<String>,
        endpoint: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            provider_type: provider_type.into(),
            endpoint: endpoint.into(),
            path: path.into(),
        }
    }

    /// The URL formed from endpoint and path.
    ///
    /// An endpoint without a scheme gets `provider_type://` prepended.
    pub fn url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        if endpoint.contains("://") {
            format!("{}/{}", endpoint, path)
        } else {
            format!("{}://{}/{}", self.provider_type, endpoint, path)
        }
    }
}

/// Fetches configuration payloads from a remote system.
///
/// Implement this trait to plug in a backing system (etcd, Consul, ...).
/// Register it with
/// [`ConfigManagerBuilder::with_remote_fetcher`](crate::core::ConfigManagerBuilder::with_remote_fetcher).
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch the current configuration as a settings table.
    async fn fetch(&self, provider: &RemoteProvider) -> Result<Table>;

    /// Check the remote source during a watch tick.
    ///
    /// The default implementation performs a full fetch and discards the result.
    async fn check(&self, provider: &RemoteProvider) -> Result<()> {
        self.fetch(provider).await.map(|_| ())
    }
}

/// Loads configuration from a [`RemoteFetcher`] under an internal deadline.
pub struct RemoteConfigProvider {
    descriptor: Arc<RemoteProvider>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
    layers: SourceLayers,
    timeout: Duration,
}

impl RemoteConfigProvider {
    /// Create a new remote provider.
    ///
    /// A `None` fetcher means the descriptor's type is unsupported; every
    /// load then fails with [`ConfigError::UnsupportedRemote`].
    pub fn new(
        descriptor: Arc<RemoteProvider>,
        fetcher: Option<Arc<dyn RemoteFetcher>>,
        layers: SourceLayers,
    ) -> Self {
        Self {
            descriptor,
            fetcher,
            layers,
            timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Set the load deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch, merge over defaults, bind and publish.
    ///
    /// The fetch runs on its own task and races the deadline. When the
    /// deadline wins, [`ConfigError::Timeout`] is returned and the fetch task
    /// is detached rather than awaited.
    pub async fn load<S>(&self, target: &LoadTarget<S>) -> Result<()> {
        let fetcher = self.fetcher.clone().ok_or_else(|| {
            ConfigError::UnsupportedRemote(self.descriptor.provider_type.clone())
        })?;

        let descriptor = Arc::clone(&self.descriptor);
        let fetch = tokio::spawn(async move { fetcher.fetch(&descriptor).await });

        let table = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(Ok(result)) => result.inspect_err(|e| {
                tracing::error!(
                    endpoint = %self.descriptor.endpoint,
                    error = %e,
                    "Failed to read remote config"
                );
            })?,
            Ok(Err(join_error)) => {
                return Err(ConfigError::RemoteError(format!(
                    "Remote fetch task failed: {}",
                    join_error
                )));
            }
            Err(_) => {
                tracing::error!(
                    endpoint = %self.descriptor.endpoint,
                    timeout = ?self.timeout,
                    "Remote config operation timed out"
                );
                return Err(ConfigError::Timeout);
            }
        };

        let mut candidate = self.layers.stage();
        candidate.merge(table);
        target.commit(candidate)?;

        tracing::debug!(endpoint = %self.descriptor.endpoint, "Successfully loaded remote configuration");
        Ok(())
    }

    /// A human-readable name for logging.
    pub fn name(&self) -> String {
        format!("{}:{}", self.descriptor.provider_type, self.descriptor.url())
    }
}

/// Pick the fetcher for a descriptor: an explicitly registered one wins,
/// otherwise `http`/`https` use the built-in [`HttpFetcher`].
pub(crate) fn resolve_fetcher(
    descriptor: &RemoteProvider,
    custom: Option<Arc<dyn RemoteFetcher>>,
) -> Result<Option<Arc<dyn RemoteFetcher>>> {
    if custom.is_some() {
        return Ok(custom);
    }
    match descriptor.provider_type.to_ascii_lowercase().as_str() {
        #[cfg(feature = "remote")]
        "http" | "https" => Ok(Some(Arc::new(HttpFetcher::builder().build()?))),
        #[cfg(not(feature = "remote"))]
        "http" | "https" => Err(ConfigError::FeatureNotEnabled("remote")),
        other => {
            tracing::warn!(provider_type = %other, "No fetcher registered for remote provider type");
            Ok(None)
        }
    }
}

/// Convert a JSON document into a settings table.
///
/// # Errors
///
/// Returns [`ConfigError::DeserializationError`] unless the root is an object.
pub fn table_from_json(json: JsonValue) -> Result<Table> {
    match json {
        JsonValue::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| (key, value_from_json(value)))
            .collect()),
        _ => Err(ConfigError::DeserializationError(
            "Expected JSON object at root level".to_string(),
        )),
    }
}

fn value_from_json(value: JsonValue) -> Value {
    let kind = match value {
        JsonValue::Null => ValueKind::Nil,
        JsonValue::Bool(b) => ValueKind::Boolean(b),
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => ValueKind::I64(i),
            (None, Some(u)) => ValueKind::U64(u),
            _ => ValueKind::Float(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => ValueKind::String(s),
        JsonValue::Array(items) => {
            ValueKind::Array(items.into_iter().map(value_from_json).collect())
        }
        JsonValue::Object(map) => {
            return table_value(
                map.into_iter()
                    .map(|(key, value)| (key, value_from_json(value)))
                    .collect(),
            );
        }
    };
    Value::new(None, kind)
}

#[cfg(feature = "remote")]
pub use http::{HttpAuth, HttpFetcher, HttpFetcherBuilder};

#[cfg(feature = "remote")]
mod http {
    use super::{RemoteFetcher, RemoteProvider, table_from_json};
    use crate::core::store::Table;
    use crate::error::{ConfigError, Result};
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use reqwest::{Client, header::HeaderValue};
    use serde_json::Value as JsonValue;
    use std::time::Duration;

    /// Authentication method for HTTP requests.
    #[derive(Clone)]
    pub enum HttpAuth {
        /// No authentication
        None,
        /// Bearer token authentication
        Bearer(String),
        /// Basic authentication (username, password)
        Basic(String, String),
    }

    /// HTTP-based remote fetcher.
    ///
    /// Issues `GET` requests against [`RemoteProvider::url`] and expects a JSON
    /// object in response. Keeps the last successfully fetched payload.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use strata_config::sources::HttpFetcher;
    /// use std::time::Duration;
    ///
    /// # fn example() -> strata_config::error::Result<()> {
    /// let fetcher = HttpFetcher::builder()
    ///     .with_auth_token("secret-token")
    ///     .with_timeout(Duration::from_secs(10))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub struct HttpFetcher {
        client: Client,
        auth: HttpAuth,
        last_known_good: RwLock<Option<Table>>,
    }

    impl HttpFetcher {
        /// Create a new builder for constructing an HTTP fetcher.
        pub fn builder() -> HttpFetcherBuilder {
            HttpFetcherBuilder::new()
        }

        /// The payload of the last successful fetch, if any.
        pub fn last_known_good(&self) -> Option<Table> {
            self.last_known_good.read().clone()
        }
    }

    #[async_trait]
    impl RemoteFetcher for HttpFetcher {
        async fn fetch(&self, provider: &RemoteProvider) -> Result<Table> {
            let mut request = self.client.get(provider.url());

            request = match &self.auth {
                HttpAuth::None => request,
                HttpAuth::Bearer(token) => {
                    let header_value = HeaderValue::from_str(&format!("Bearer {}", token))
                        .map_err(|e| {
                            ConfigError::RemoteError(format!("Invalid bearer token: {}", e))
                        })?;
                    request.header("Authorization", header_value)
                }
                HttpAuth::Basic(username, password) => {
                    request.basic_auth(username, Some(password))
                }
            };

            let response = request
                .send()
                .await
                .map_err(|e| ConfigError::RemoteError(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ConfigError::RemoteError(format!(
                    "HTTP request failed with status {}: {}",
                    status,
                    status.canonical_reason().unwrap_or("Unknown")
                )));
            }

            let json: JsonValue = response.json().await.map_err(|e| {
                ConfigError::DeserializationError(format!("Failed to parse JSON: {}", e))
            })?;

            let table = table_from_json(json)?;
            *self.last_known_good.write() = Some(table.clone());

            Ok(table)
        }
    }

    /// Builder for constructing an [`HttpFetcher`].
    pub struct HttpFetcherBuilder {
        auth: HttpAuth,
        timeout: Duration,
    }

    impl HttpFetcherBuilder {
        /// Create a new builder with default settings.
        pub fn new() -> Self {
            Self {
                auth: HttpAuth::None,
                timeout: Duration::from_secs(10),
            }
        }

        /// Set Bearer token authentication.
        pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
            self.auth = HttpAuth::Bearer(token.into());
            self
        }

        /// Set Basic authentication.
        pub fn with_basic_auth(
            mut self,
            username: impl Into<String>,
            password: impl Into<String>,
        ) -> Self {
            self.auth = HttpAuth::Basic(username.into(), password.into());
            self
        }

        /// Set the per-request timeout. Default is 10 seconds.
        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = timeout;
            self
        }

        /// Build the HTTP fetcher.
        ///
        /// # Errors
        ///
        /// Returns an error if the HTTP client cannot be constructed.
        pub fn build(self) -> Result<HttpFetcher> {
            let client = Client::builder().timeout(self.timeout).build().map_err(|e| {
                ConfigError::RemoteError(format!("Failed to create HTTP client: {}", e))
            })?;

            Ok(HttpFetcher {
                client,
                auth: self.auth,
                last_known_good: RwLock::new(None),
            })
        }
    }

    impl Default for HttpFetcherBuilder {
        fn default() -> Self {
            Self::new()
        }
    }
}
