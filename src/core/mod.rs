//! Core configuration management types.

mod builder;
mod coerce;
mod manager;
mod schema;
pub(crate) mod store;

pub use builder::ConfigManagerBuilder;
pub use coerce::Coerce;
pub use manager::{ConfigManager, ReloadPolicy};
pub use schema::{SchemaBinder, bind_schema};
pub use store::{SettingsStore, Table};
