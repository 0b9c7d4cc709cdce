//! The active configuration source and the state it publishes into.

use super::{LocalConfigProvider, RemoteConfigProvider};
use crate::core::{SchemaBinder, SettingsStore};
use crate::error::Result;
use arc_swap::ArcSwapOption;
use config::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The source a [`ConfigManager`](crate::core::ConfigManager) loads from.
///
/// Selected once at construction: a remote descriptor selects
/// [`SourceProvider::Remote`], otherwise the local file is used. Both
/// variants follow the same reload sequence: stage a fresh store with
/// defaults and the environment overlay, merge the source, bind the schema,
/// then publish.
pub enum SourceProvider {
    /// File-based source
    Local(LocalConfigProvider),
    /// Remote service source
    Remote(RemoteConfigProvider),
}

impl SourceProvider {
    /// Perform one full reload into `target`.
    ///
    /// # Errors
    ///
    /// Any failure leaves `target` untouched.
    pub async fn load<S>(&self, target: &LoadTarget<S>) -> Result<()>
    where
        S: Send + Sync,
    {
        match self {
            Self::Local(provider) => provider.load(target),
            Self::Remote(provider) => provider.load(target).await,
        }
    }

    /// A human-readable name for logging.
    pub fn name(&self) -> String {
        match self {
            Self::Local(provider) => provider.name(),
            Self::Remote(provider) => provider.name(),
        }
    }
}

/// Defaults and environment prefix re-applied at the start of every load.
#[derive(Debug, Clone, Default)]
pub struct SourceLayers {
    defaults: HashMap<String, Value>,
    env_prefix: Option<String>,
}

impl SourceLayers {
    /// Create the layers from a defaults map and optional env prefix.
    pub fn new(defaults: HashMap<String, Value>, env_prefix: Option<String>) -> Self {
        Self {
            defaults,
            env_prefix,
        }
    }

    /// Returns `true` if any defaults were registered.
    pub fn has_defaults(&self) -> bool {
        !self.defaults.is_empty()
    }

    /// A fresh store holding only defaults and the environment overlay.
    pub fn stage(&self) -> SettingsStore {
        let mut store = SettingsStore::new();
        for (key, value) in &self.defaults {
            tracing::trace!(key = %key, "Applying default value");
            store.set_default(key, value.clone());
        }
        store.set_env_prefix(self.env_prefix.as_deref());
        store
    }
}

/// Shared state a [`SourceProvider`] publishes into.
///
/// Holds the store behind a reader-writer lock and the last successfully
/// bound schema instance.
pub struct LoadTarget<S> {
    store: RwLock<SettingsStore>,
    schema: ArcSwapOption<S>,
    binder: Option<SchemaBinder<S>>,
}

impl<S> LoadTarget<S> {
    pub(crate) fn new(binder: Option<SchemaBinder<S>>) -> Self {
        Self {
            store: RwLock::new(SettingsStore::new()),
            schema: ArcSwapOption::empty(),
            binder,
        }
    }

    /// The lock guarding the published store.
    pub fn store(&self) -> &RwLock<SettingsStore> {
        &self.store
    }

    /// The last successfully bound schema, if any.
    pub fn schema(&self) -> Option<Arc<S>> {
        self.schema.load_full()
    }

    /// Bind the schema against `candidate` and, if that succeeds, publish
    /// both atomically.
    ///
    /// The candidate is private to the caller until the swap, so readers see
    /// either the previous store or the complete new one. On error nothing
    /// is published.
    pub(crate) fn commit(&self, candidate: SettingsStore) -> Result<()> {
        let bound = match &self.binder {
            Some(binder) => Some(Arc::new(binder.bind(&candidate)?)),
            None => None,
        };

        let mut store = self.store.write();
        *store = candidate;
        if bound.is_some() {
            self.schema.store(bound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use validator::Validate;

    #[derive(Debug, Deserialize, Validate)]
    struct PortSchema {
        #[validate(range(min = 1))]
        port: u16,
    }

    #[test]
    fn test_stage_applies_defaults() {
        let mut defaults = HashMap::new();
        defaults.insert("server.port".to_string(), Value::from(9999i64));
        let layers = SourceLayers::new(defaults, None);

        let store = layers.stage();
        assert!(layers.has_defaults());
        assert_eq!(store.get_as::<i64>("server.port"), 9999);
    }

    #[test]
    fn test_commit_publishes_store_and_schema() {
        let target = LoadTarget::new(Some(SchemaBinder::<PortSchema>::new()));
        let mut candidate = SettingsStore::new();
        candidate.set("port", 8080i64);

        target.commit(candidate).unwrap();

        assert_eq!(target.store().read().get_as::<i64>("port"), 8080);
        assert_eq!(target.schema().unwrap().port, 8080);
    }

    #[test]
    fn test_failed_commit_keeps_last_known_good() {
        let target = LoadTarget::new(Some(SchemaBinder::<PortSchema>::new()));
        let mut good = SettingsStore::new();
        good.set("port", 8080i64);
        target.commit(good).unwrap();

        let mut bad = SettingsStore::new();
        bad.set("port", 0i64);
        bad.set("extra", "stale");
        assert!(target.commit(bad).is_err());

        let store = target.store().read();
        assert_eq!(store.get_as::<i64>("port"), 8080);
        assert!(!store.is_set("extra"));
        assert_eq!(target.schema().unwrap().port, 8080);
    }
}
