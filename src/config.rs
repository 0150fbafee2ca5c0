//! Hierarchical job configuration
//!
//! A job is described by one tree of settings. Each pipeline component owns a
//! dotted scope inside that tree (`extractor.csv`, `publisher.neo4j`, ...) and
//! is built from the sub-tree found there.
//!
//! Example format:
//! ```yaml
//! job:
//!   identifier: table_metadata
//!   kind: graph
//! publisher:
//!   neo4j:
//!     neo4j_endpoint: http://localhost:7474
//!     neo4j_password: ${NEO4J_PASSWORD}
//!     job_publish_tag: "2024-01-01"
//! ```
//!
//! String values may reference environment variables: `${VAR}` must be set,
//! `${?VAR}` is dropped from the tree when unset.

use eyre::{Context, Result, eyre};
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::LazyLock;

static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(\?)?([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern is valid")
});

/// A component whose settings live under a fixed dotted scope
pub trait Scoped {
    const SCOPE: &'static str;
}

/// A component that can be built from its scoped settings
pub trait FromConfig: Sized {
    fn from_config(conf: &ConfigTree) -> Result<Self>;
}

/// Build a component from the job config, scoping it first
pub fn build<C: Scoped + FromConfig>(job_conf: &ConfigTree) -> Result<C> {
    C::from_config(&job_conf.scoped(C::SCOPE))
        .with_context(|| format!("Failed to configure '{}'", C::SCOPE))
}

/// Nested configuration tree addressed with dotted keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    root: Map<String, Value>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a JSON object, expanding dotted keys
    ///
    /// # Errors
    /// Returns an error if the value is not an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let mut tree = Self::new();
                for (key, value) in map {
                    tree.set(&key, expand(value));
                }
                Ok(tree)
            }
            Value::Null => Ok(Self::new()),
            other => eyre::bail!("Config root must be an object, got: {}", other),
        }
    }

    /// Build a tree from `(dotted key, value)` pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut tree = Self::new();
        for (key, value) in pairs {
            tree.set(key.as_ref(), expand(value.into()));
        }
        tree
    }

    /// Load a config file, choosing the parser from the file extension
    ///
    /// `.yml`/`.yaml` are parsed as YAML, `.json`/`.json5` as JSON5.
    /// Environment references are resolved after parsing.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let value: Value = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            "json" | "json5" => json5::from_str(&content)
                .with_context(|| format!("Failed to parse JSON5 config: {}", path.display()))?,
            other => eyre::bail!(
                "Unsupported config format '{}' for {}, expected yml, yaml, json or json5",
                other,
                path.display()
            ),
        };

        let mut tree = Self::from_value(value)?;
        tree.resolve_env()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(tree)
    }

    /// Set a value at a dotted key, merging into existing objects
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let mut parts = key.split('.').filter(|p| !p.is_empty()).peekable();
        let mut current = &mut self.root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                match value.into() {
                    Value::Object(incoming) => match current.get_mut(part) {
                        Some(Value::Object(existing)) => merge_into(existing, incoming),
                        _ => {
                            current.insert(part.to_string(), Value::Object(incoming));
                        }
                    },
                    other => {
                        current.insert(part.to_string(), other);
                    }
                }
                return;
            }
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
    }

    /// Get the value at a dotted key
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.').filter(|p| !p.is_empty());
        let first = parts.next()?;
        let mut current = self.root.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get a required string value
    ///
    /// # Errors
    /// Returns an error if the key is missing or not a string
    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(eyre!("Config key '{}' must be a string, got: {}", key, other)),
            None => Err(eyre!("Missing required config key '{}'", key)),
        }
    }

    /// Get an optional string value, ignoring non-strings
    pub fn get_opt_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_opt_str(key).unwrap_or(default).to_string()
    }

    /// Get an unsigned integer, accepting numeric strings
    pub fn get_u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| eyre!("Config key '{}' must be a positive integer", key)),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .with_context(|| format!("Config key '{}' must be a positive integer", key)),
            Some(other) => eyre::bail!("Config key '{}' must be an integer, got: {}", key, other),
        }
    }

    /// Get a boolean, accepting "true"/"false" strings
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => eyre::bail!("Config key '{}' must be a boolean, got: {}", key, s),
            },
            Some(other) => eyre::bail!("Config key '{}' must be a boolean, got: {}", key, other),
        }
    }

    /// Get a list value, or an empty list when missing
    pub fn get_list(&self, key: &str) -> Vec<Value> {
        match self.get(key) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Get a list of strings from a list or a comma-separated string
    pub fn get_str_list(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(eyre!("Config key '{}' must hold strings, got: {}", key, other)),
                })
                .collect(),
            Some(other) => eyre::bail!("Config key '{}' must be a list, got: {}", key, other),
        }
    }

    /// Get the sub-tree under a dotted scope (empty when missing)
    pub fn scoped(&self, scope: &str) -> ConfigTree {
        match self.get(scope) {
            Some(Value::Object(map)) => ConfigTree { root: map.clone() },
            _ => ConfigTree::new(),
        }
    }

    /// Deep-merge `fallback` underneath this tree; values already set here win
    pub fn with_fallback(self, fallback: ConfigTree) -> ConfigTree {
        let mut root = fallback.root;
        merge_into(&mut root, self.root);
        ConfigTree { root }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Resolve `${VAR}` and `${?VAR}` references in every string value
    pub fn resolve_env(&mut self) -> Result<()> {
        resolve_map(&mut self.root, &|name| std::env::var(name).ok())
    }
}

/// Expand dotted keys inside nested objects
fn expand(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut tree = ConfigTree::new();
            for (key, value) in map {
                tree.set(&key, expand(value));
            }
            Value::Object(tree.root)
        }
        other => other,
    }
}

fn merge_into(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match value {
            Value::Object(incoming) => match target.get_mut(&key) {
                Some(Value::Object(existing)) => merge_into(existing, incoming),
                _ => {
                    target.insert(key, Value::Object(incoming));
                }
            },
            other => {
                target.insert(key, other);
            }
        }
    }
}

fn resolve_map(map: &mut Map<String, Value>, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
    let keys: Vec<String> = map.keys().cloned().collect();
    for key in keys {
        let remove = match map.get_mut(&key) {
            Some(Value::String(s)) => match substitute(s, lookup)
                .with_context(|| format!("Failed to resolve config key '{}'", key))?
            {
                Some(resolved) => {
                    *s = resolved;
                    false
                }
                None => true,
            },
            Some(Value::Object(inner)) => {
                resolve_map(inner, lookup)?;
                false
            }
            Some(Value::Array(items)) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items.drain(..) {
                    match item {
                        Value::String(s) => {
                            if let Some(s) = substitute(&s, lookup)? {
                                resolved.push(Value::String(s));
                            }
                        }
                        Value::Object(mut inner) => {
                            resolve_map(&mut inner, lookup)?;
                            resolved.push(Value::Object(inner));
                        }
                        other => resolved.push(other),
                    }
                }
                *items = resolved;
                false
            }
            _ => false,
        };
        if remove {
            map.remove(&key);
        }
    }
    Ok(())
}

/// Substitute env references in one string
///
/// Returns `None` when the whole string is an unset optional reference.
fn substitute(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Option<String>> {
    if let Some(caps) = ENV_REF.captures(input)
        && caps.get(0).map(|m| m.as_str()) == Some(input)
        && caps.get(1).is_some()
        && lookup(&caps[2]).is_none()
    {
        return Ok(None);
    }

    let mut output = String::with_capacity(input.len());
    let mut last = 0;
    for caps in ENV_REF.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        output.push_str(&input[last..whole.start()]);
        let optional = caps.get(1).is_some();
        match lookup(&caps[2]) {
            Some(value) => output.push_str(&value),
            None if optional => {}
            None => eyre::bail!("Environment variable '{}' is not set", &caps[2]),
        }
        last = whole.end();
    }
    output.push_str(&input[last..]);
    Ok(Some(output))
}
