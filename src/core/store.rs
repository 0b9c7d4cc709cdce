//! The layered key/value settings store.

use crate::core::Coerce;
use crate::sources::EnvOverlay;
use config::{Value, ValueKind};
use std::collections::{BTreeSet, HashMap};

/// A table of settings, keyed by lower-cased key segment.
pub type Table = config::Map<String, Value>;

/// Layered key/value container addressed by dotted keys (`server.port`).
///
/// Lookups consult, from highest to lowest precedence:
/// 1. the environment overlay (if a prefix is configured),
/// 2. values merged from the active source,
/// 3. registered defaults.
///
/// Keys are case-insensitive. `Nil` values count as unset. The spelling a
/// key was first written with is remembered for
/// [`settings_as_written`](Self::settings_as_written), which schema binding
/// decodes from.
///
/// The store itself is not synchronized; [`ConfigManager`](crate::core::ConfigManager)
/// guards it with a reader-writer lock.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    defaults: Table,
    values: Table,
    env: Option<EnvOverlay>,
    /// Normalized dotted path -> last segment as written
    spellings: HashMap<String, String>,
}

impl SettingsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable (or disable) the environment overlay.
    pub fn set_env_prefix(&mut self, prefix: Option<&str>) {
        self.env = prefix.filter(|p| !p.is_empty()).map(EnvOverlay::new);
    }

    /// Register a default for `key`. Defaults survive [`reset`](Self::reset).
    pub fn set_default(&mut self, key: &str, value: impl Into<Value>) {
        self.record_key(key);
        insert_path(&mut self.defaults, key, value.into());
    }

    /// Set `key` in the values layer, overriding any default.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.record_key(key);
        insert_path(&mut self.values, key, value.into());
    }

    /// Deep-merge a parsed source table into the values layer.
    ///
    /// Nested tables merge key by key; any other value replaces what was there.
    pub fn merge(&mut self, table: Table) {
        record_spellings(&mut self.spellings, &table, "");
        deep_merge(&mut self.values, normalize_table(table));
    }

    /// Clear every value while keeping registered defaults.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Look up the effective value for `key`.
    ///
    /// For a table key the result merges defaults and values, and the
    /// environment overlay applies to each leaf, so `get("server")` agrees
    /// with `get("server.port")`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let key = normalize_key(key);
        if let Some(value) = self.env.as_ref().and_then(|env| env.lookup(&key)) {
            return Some(value);
        }

        let found = match (lookup_path(&self.values, &key), lookup_path(&self.defaults, &key)) {
            (Some(value), Some(default)) => match (&value.kind, &default.kind) {
                (ValueKind::Table(_), ValueKind::Table(_)) => {
                    let mut merged = default.clone().into_table().unwrap_or_default();
                    deep_merge(&mut merged, value.clone().into_table().unwrap_or_default());
                    Some(table_value(merged))
                }
                _ => Some(value.clone()),
            },
            (Some(value), None) => Some(value.clone()),
            (None, default) => default.cloned(),
        }?;

        match (found.kind, &self.env) {
            (ValueKind::Table(mut table), Some(env)) => {
                overlay_leaves(env, &key, &mut table);
                Some(table_value(table))
            }
            (kind, _) => Some(Value::new(None, kind)),
        }
    }

    /// Coerce the value for `key` into `T`, returning `None` when the key is
    /// absent or the value cannot represent `T`.
    pub fn lookup_as<T: Coerce>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::coerce)
    }

    /// Coerce the value for `key` into `T`, falling back to `T::default()`.
    pub fn get_as<T: Coerce + Default>(&self, key: &str) -> T {
        self.lookup_as(key).unwrap_or_default()
    }

    /// Returns `true` if any layer supplies a value for `key`.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All leaf keys known to the defaults and values layers, sorted.
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys = BTreeSet::new();
        collect_leaves(&self.defaults, "", &mut keys);
        collect_leaves(&self.values, "", &mut keys);
        keys.into_iter().collect()
    }

    /// A nested snapshot of every effective setting, environment included.
    pub fn all_settings(&self) -> Table {
        let mut settings = Table::new();
        for key in self.all_keys() {
            if let Some(value) = self.get(&key) {
                insert_path(&mut settings, &key, value);
            }
        }
        settings
    }

    /// Like [`all_settings`](Self::all_settings), but each key segment keeps
    /// the spelling it was written with (`maxConns` rather than `maxconns`).
    ///
    /// When the same key was written with different spellings, the most
    /// recent one wins.
    pub fn settings_as_written(&self) -> Table {
        let mut settings = Table::new();
        for key in self.all_keys() {
            if let Some(value) = self.get(&key) {
                insert_segments(&mut settings, &self.written_key(&key), value);
            }
        }
        settings
    }

    fn record_key(&mut self, key: &str) {
        let mut path = String::new();
        for segment in key.trim().split('.') {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(&normalize_key(segment));
            self.spellings.insert(path.clone(), segment.trim().to_string());
        }
    }

    fn written_key(&self, key: &str) -> String {
        let mut path = String::new();
        let mut written = Vec::new();
        for segment in key.split('.') {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(segment);
            written.push(
                self.spellings
                    .get(&path)
                    .map(String::as_str)
                    .unwrap_or(segment),
            );
        }
        written.join(".")
    }
}

pub(crate) fn table_value(table: Table) -> Value {
    Value::new(None, ValueKind::Table(table))
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

fn normalize_table(table: Table) -> Table {
    table
        .into_iter()
        .map(|(key, value)| {
            let value = match value.kind {
                ValueKind::Table(inner) => table_value(normalize_table(inner)),
                _ => value,
            };
            (normalize_key(&key), value)
        })
        .collect()
}

fn lookup_path<'a>(table: &'a Table, key: &str) -> Option<&'a Value> {
    let mut segments = key.split('.');
    let mut current = table.get(segments.next()?)?;
    for segment in segments {
        match &current.kind {
            ValueKind::Table(inner) => current = inner.get(segment)?,
            _ => return None,
        }
    }
    match current.kind {
        ValueKind::Nil => None,
        _ => Some(current),
    }
}

fn insert_path(table: &mut Table, key: &str, value: Value) {
    insert_segments(table, &normalize_key(key), value);
}

fn insert_segments(table: &mut Table, key: &str, value: Value) {
    let mut segments: Vec<&str> = key.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = table;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| table_value(Table::new()));
        if !matches!(entry.kind, ValueKind::Table(_)) {
            entry.kind = ValueKind::Table(Table::new());
        }
        match &mut entry.kind {
            ValueKind::Table(inner) => current = inner,
            _ => return,
        }
    }
    current.insert(leaf.to_string(), value);
}

fn deep_merge(dst: &mut Table, src: Table) {
    for (key, value) in src {
        match value.kind {
            ValueKind::Table(incoming) => match dst.get_mut(&key) {
                Some(Value {
                    kind: ValueKind::Table(existing),
                    ..
                }) => deep_merge(existing, incoming),
                _ => {
                    dst.insert(key, table_value(incoming));
                }
            },
            kind => {
                dst.insert(key, Value::new(None, kind));
            }
        }
    }
}

fn record_spellings(spellings: &mut HashMap<String, String>, table: &Table, prefix: &str) {
    for (key, value) in table {
        let normalized = normalize_key(key);
        let path = if prefix.is_empty() {
            normalized
        } else {
            format!("{}.{}", prefix, normalized)
        };
        spellings.insert(path.clone(), key.trim().to_string());
        if let ValueKind::Table(inner) = &value.kind {
            record_spellings(spellings, inner, &path);
        }
    }
}

fn overlay_leaves(env: &EnvOverlay, prefix: &str, table: &mut Table) {
    for (key, value) in table.iter_mut() {
        let path = format!("{}.{}", prefix, key);
        match &mut value.kind {
            ValueKind::Table(inner) => overlay_leaves(env, &path, inner),
            _ => {
                if let Some(overridden) = env.lookup(&path) {
                    *value = overridden;
                }
            }
        }
    }
}

fn collect_leaves(table: &Table, prefix: &str, keys: &mut BTreeSet<String>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match &value.kind {
            ValueKind::Table(inner) if !inner.is_empty() => collect_leaves(inner, &path, keys),
            ValueKind::Nil => {}
            _ => {
                keys.insert(path);
            }
        }
    }
}
