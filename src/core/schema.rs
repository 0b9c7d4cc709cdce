//! Schema binding and validation.

use crate::core::SettingsStore;
use crate::core::store::{Table, table_value};
use crate::error::{ConfigError, Result, ValidationError};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Binds settings snapshots into a typed schema and validates them.
///
/// A schema is any type implementing both [`serde::Deserialize`] and
/// [`validator::Validate`]. Field constraints are declared with the
/// `#[validate(...)]` attributes (`range`, `length`, `url`, `required`,
/// `custom`, `nested` to dive into structs and sequences).
///
/// Binding stops at the first violated constraint; fields are inspected in
/// sorted order so the reported violation is deterministic.
///
/// # Examples
///
/// ```rust
/// use serde::Deserialize;
/// use strata_config::core::{SchemaBinder, SettingsStore};
/// use validator::Validate;
///
/// #[derive(Debug, Deserialize, Validate)]
/// struct ServerConfig {
///     #[validate(range(min = 1024))]
///     port: u16,
/// }
///
/// let mut store = SettingsStore::new();
/// store.set("port", 80i64);
///
/// let err = SchemaBinder::<ServerConfig>::new().bind(&store).unwrap_err();
/// assert_eq!(err.as_validation().unwrap().field, "port");
/// ```
pub struct SchemaBinder<S> {
    bind_fn: fn(Table) -> Result<S>,
}

impl<S> SchemaBinder<S>
where
    S: DeserializeOwned + Validate,
{
    /// Create a binder for schema type `S`.
    pub fn new() -> Self {
        Self {
            bind_fn: bind_schema::<S>,
        }
    }
}

impl<S> SchemaBinder<S> {
    /// Decode the store's effective settings into `S` and validate them.
    ///
    /// Keys are matched with the spelling the source used, so a
    /// `#[serde(rename_all = "camelCase")]` schema binds `maxConns`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::DeserializationError`] if the settings cannot be decoded
    /// - [`ConfigError::ValidationFailed`] if a constraint is violated
    pub fn bind(&self, store: &SettingsStore) -> Result<S> {
        (self.bind_fn)(store.settings_as_written())
    }
}

impl<S> Clone for SchemaBinder<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for SchemaBinder<S> {}

impl<S> Default for SchemaBinder<S>
where
    S: DeserializeOwned + Validate,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a settings table into `S`, then run its validation rules.
pub fn bind_schema<S>(settings: Table) -> Result<S>
where
    S: DeserializeOwned + Validate,
{
    let schema: S = table_value(settings)
        .try_deserialize()
        .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

    schema.validate().map_err(|errors| {
        let violation = first_violation(&errors, "").unwrap_or_else(|| {
            ValidationError::new("<root>", "invalid").with_message(errors.to_string())
        });
        ConfigError::ValidationFailed(violation)
    })?;

    Ok(schema)
}

fn first_violation(errors: &ValidationErrors, prefix: &str) -> Option<ValidationError> {
    let mut fields: Vec<(String, &ValidationErrorsKind)> = errors
        .errors()
        .iter()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields.into_iter().find_map(|(name, kind)| {
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{}.{}", prefix, name)
        };
        match kind {
            ValidationErrorsKind::Field(violations) => violations.first().map(|v| {
                let err = ValidationError::new(path, v.code.to_string());
                match &v.message {
                    Some(message) => err.with_message(message.to_string()),
                    None => err,
                }
            }),
            ValidationErrorsKind::Struct(inner) => first_violation(inner, &path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(index, inner)| first_violation(inner, &format!("{}[{}]", path, index))),
        }
    })
}
