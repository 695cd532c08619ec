//! JSON documents on disk.
//!
//! Instance config files, the per-instance `.ghost-cli` state and the
//! system-wide instance list are all JSON objects addressed by dotted keys
//! (`server.port` ⇒ `{"server": {"port": ...}}`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use tracing::warn;

/// Reads and parses a JSON file, returning `None` if it is missing or invalid.
pub fn read_json_if_valid(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Resolves a dotted path inside a JSON tree.
pub fn lookup<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .try_fold(value, |node, segment| node.as_object()?.get(segment))
}

/// Loose truthiness: `null`, `false`, `0`, `""` and `NaN` count as absent.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A JSON object backed by a file, read fully on load and written on `save`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl JsonStore {
    /// Loads `path`; a missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                values: Map::new(),
            });
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                values: Map::new(),
            });
        }
        let parsed: Value = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let Value::Object(values) = parsed else {
            bail!("{} does not contain a JSON object", path.display());
        };
        Ok(Self { path, values })
    }

    /// Loads `path`, treating a missing, malformed or non-object file as empty.
    ///
    /// Only for read-only use: saving the result would discard the bad file.
    pub fn load_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match read_json_if_valid(&path) {
            Some(Value::Object(values)) => values,
            _ => {
                if path.exists() {
                    warn!(path = %path.display(), "ignoring file that is not a JSON object");
                }
                Map::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split('.');
        let first = segments.next()?;
        segments.try_fold(self.values.get(first)?, |node, segment| {
            node.as_object()?.get(segment)
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// True when the key is present with a non-null value.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).map(|value| !value.is_null()).unwrap_or(false)
    }

    /// Sets a dotted key, creating intermediate objects. `Value::Null` removes it.
    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        set_path(&mut self.values, key, value);
        self
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let raw = serde_json::to_string_pretty(&Value::Object(self.values.clone()))?;
        fs::write(&self.path, format!("{raw}\n"))
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

fn set_path(root: &mut Map<String, Value>, key: &str, value: Value) {
    let segments: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut node = root;
    for segment in parents {
        if value.is_null() && !node.get(*segment).is_some_and(Value::is_object) {
            return;
        }
        let entry = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }
    if value.is_null() {
        node.remove(*last);
    } else {
        node.insert(last.to_string(), value);
    }
}
