//! Configuration source implementations.

mod env;
mod file;
mod provider;
mod remote;

pub use env::EnvOverlay;
pub use file::LocalConfigProvider;
pub use provider::{LoadTarget, SourceLayers, SourceProvider};
pub use remote::{
    DEFAULT_REMOTE_TIMEOUT, RemoteConfigProvider, RemoteFetcher, RemoteProvider, table_from_json,
};

#[cfg(feature = "remote")]
pub use remote::{HttpAuth, HttpFetcher, HttpFetcherBuilder};

pub(crate) use remote::resolve_fetcher;
