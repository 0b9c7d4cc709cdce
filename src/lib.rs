//! # strata-config
//!
//! Layered configuration resolution with typed access, schema validation and
//! live reload.
//!
//! ## Overview
//!
//! `strata-config` resolves settings from up to four layers, highest
//! precedence first:
//!
//! 1. Environment variables (`<PREFIX>_<KEY>`, dots become underscores)
//! 2. A remote configuration service, or
//! 3. a local YAML/JSON/TOML file
//! 4. Programmatic defaults
//!
//! Loads are transactional: the new settings are staged, bound into an
//! optional schema and validated, then published in one atomic step. A load
//! that fails at any stage leaves the previous settings in place.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata_config::prelude::*;
//! use serde::Deserialize;
//! use validator::Validate;
//!
//! #[derive(Debug, Deserialize, Validate)]
//! struct AppConfig {
//!     #[validate(nested)]
//!     server: ServerConfig,
//! }
//!
//! #[derive(Debug, Deserialize, Validate)]
//! struct ServerConfig {
//!     #[validate(range(min = 1, max = 65535))]
//!     port: u16,
//! }
//!
//! # async fn example() -> strata_config::error::Result<()> {
//! let config = ConfigManager::builder()
//!     .with_file("config/default.yaml")
//!     .with_env_prefix("APP")
//!     .with_default("server.port", 8080)
//!     .with_schema::<AppConfig>()
//!     .build()?;
//!
//! config.load().await?;
//! println!("Server port: {}", config.get_int("server.port"));
//!
//! // Reload on every change to the file
//! let handle = config.clone();
//! config.watch(CancellationToken::new(), move || {
//!     println!("Server port is now {}", handle.get_int("server.port"));
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): filesystem notifications for local files
//! - `remote` (default): the built-in HTTP fetcher
//!
//! Other remote systems plug in through [`sources::RemoteFetcher`].

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod sources;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{ConfigManager, ConfigManagerBuilder, ReloadPolicy};
    pub use crate::error::{ConfigError, Result, ValidationError};
    pub use crate::sources::{RemoteFetcher, RemoteProvider};
    pub use tokio_util::sync::CancellationToken;
}
