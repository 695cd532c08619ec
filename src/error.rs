//! Structured failure kinds surfaced to the command layer.
//!
//! Commands return `anyhow::Result`; the types here travel inside it and are
//! recovered with `downcast_ref` wherever the kind matters (reporting, tests).

use serde_json::{Map, Value};
use thiserror::Error;

/// A configuration file that is unreadable, malformed, or fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigError {
    /// Human readable failure message.
    pub message: String,
    /// Environment whose config file was inspected.
    pub environment: String,
    /// Title of the task that raised the error.
    pub task: Option<String>,
    /// The offending dotted key and its value, when a single option failed.
    pub config: Option<Map<String, Value>>,
}

impl ConfigError {
    pub fn new(message: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            environment: environment.into(),
            task: None,
            config: None,
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a singleton `key -> value` mapping.
    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        let mut config = Map::new();
        config.insert(key.into(), value);
        self.config = Some(config);
        self
    }
}

/// An operational precondition was violated (no install, nothing running, ...).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SystemError {
    pub message: String,
}

impl SystemError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The process supervisor or an external tool failed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProcessError {
    pub message: String,
}

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Renders an error chain for the terminal, adding config details when present.
pub fn describe(err: &anyhow::Error) -> String {
    let mut out = format!("{err:#}");
    if let Some(config_err) = err.downcast_ref::<ConfigError>() {
        out.push_str(&format!("\n  environment: {}", config_err.environment));
        if let Some(task) = &config_err.task {
            out.push_str(&format!("\n  task: {task}"));
        }
        if let Some(config) = &config_err.config {
            for (key, value) in config {
                out.push_str(&format!("\n  {key}: {value}"));
            }
        }
    }
    out
}
