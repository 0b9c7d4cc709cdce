//! Environment variable overlay.

use config::{Value, ValueKind};
use std::env;

/// Environment variable overlay for dotted settings keys.
///
/// A key such as `server.port` is overridden by the variable
/// `<PREFIX>_SERVER_PORT`: dots become underscores and the name is
/// upper-cased. Variables are read on every lookup, so changes in the process
/// environment are visible without a reload.
///
/// # Examples
///
/// ```rust
/// use strata_config::sources::EnvOverlay;
///
/// // SYNX_SERVER_PORT=8080 -> server.port = "8080"
/// let overlay = EnvOverlay::new("SYNX");
/// assert_eq!(overlay.var_name("server.port"), "SYNX_SERVER_PORT");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOverlay {
    prefix: String,
}

impl EnvOverlay {
    /// Create a new overlay for variables starting with `prefix`.
    ///
    /// A trailing underscore on the prefix is ignored, so `"APP"` and
    /// `"APP_"` are equivalent.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('_').to_uppercase(),
        }
    }

    /// The prefix, upper-cased.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The environment variable name that overrides `key`.
    pub fn var_name(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.replace('.', "_").to_uppercase())
    }

    /// The override for `key`, if the corresponding variable is set.
    ///
    /// Values are returned as strings; typed accessors and schema binding
    /// coerce them on demand. Variables that are not valid unicode are ignored.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        env::var(self.var_name(key))
            .ok()
            .map(|raw| Value::new(None, ValueKind::String(raw)))
    }
}

#[cfg(test)]
#[allow(unsafe_code)] // For env var manipulation in tests
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_overlay_creation() {
        let overlay = EnvOverlay::new("app_");
        assert_eq!(overlay.prefix(), "APP");
    }

    #[test]
    fn test_var_name() {
        let overlay = EnvOverlay::new("SYNX");
        assert_eq!(overlay.var_name("server.port"), "SYNX_SERVER_PORT");
        assert_eq!(
            overlay.var_name("storage.elasticsearch.endpoint"),
            "SYNX_STORAGE_ELASTICSEARCH_ENDPOINT"
        );
    }

    #[test]
    fn test_lookup() {
        let overlay = EnvOverlay::new("ENV_OVERLAY_TEST");
        assert!(overlay.lookup("server.host").is_none());

        unsafe {
            env::set_var("ENV_OVERLAY_TEST_SERVER_HOST", "0.0.0.0");
        }
        let value = overlay.lookup("server.host").unwrap();
        assert_eq!(value.into_string().unwrap(), "0.0.0.0");

        unsafe {
            env::remove_var("ENV_OVERLAY_TEST_SERVER_HOST");
        }
        assert!(overlay.lookup("server.host").is_none());
    }

    proptest! {
        #[test]
        fn prop_var_name_has_no_dots(segments in proptest::collection::vec("[a-z][a-z0-9]{0,8}", 1..5)) {
            let key = segments.join(".");
            let name = EnvOverlay::new("APP").var_name(&key);
            prop_assert!(!name.contains('.'));
            prop_assert!(name.starts_with("APP_"));
            prop_assert_eq!(name.to_lowercase(), format!("app_{}", segments.join("_")));
        }
    }
}
