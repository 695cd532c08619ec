//! One installed copy of Ghost, identified by its directory.
//!
//! An instance is rebuilt from disk on every invocation: `.ghost-cli` holds
//! its local state (name, `running` marker, start command) and
//! `config.<env>.json` holds the application config for each environment.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::doctor::InstanceHandle;
use crate::error::SystemError;
use crate::process::{ProcessRegistry, Service};
use crate::store::JsonStore;

pub const LOCAL_STATE_FILE: &str = ".ghost-cli";

pub fn config_file_name(environment: &str) -> String {
    format!("config.{environment}.json")
}

/// Fails unless `dir` looks like a Ghost install.
pub fn check_valid_install(command: &str, dir: &Path) -> Result<()> {
    if dir.join(LOCAL_STATE_FILE).is_file() {
        return Ok(());
    }
    Err(SystemError::new(format!(
        "Working directory is not a recognisable Ghost installation. \
         Run `ghostctl {command}` again within a folder where Ghost was installed."
    ))
    .into())
}

pub struct Instance {
    dir: PathBuf,
    local: JsonStore,
    processes: ProcessRegistry,
}

impl Instance {
    pub fn load(dir: impl Into<PathBuf>, processes: ProcessRegistry) -> Result<Self> {
        let dir = dir.into();
        let local = JsonStore::load(dir.join(LOCAL_STATE_FILE))?;
        Ok(Self {
            dir,
            local,
            processes,
        })
    }

    pub fn local(&self) -> &JsonStore {
        &self.local
    }

    pub fn name(&self) -> String {
        if let Some(name) = self.local.get_str("name") {
            return name.to_string();
        }
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "ghost".to_string())
    }

    /// Environment recorded by the last `start`, if the instance is marked running.
    pub fn running_environment(&self) -> Option<&str> {
        self.local.get_str("running")
    }

    pub fn config_path(&self, environment: &str) -> PathBuf {
        self.dir.join(config_file_name(environment))
    }

    /// Loads `config.<env>.json` read-only; a missing or malformed file
    /// yields an empty config.
    pub fn instance_config(&self, environment: &str) -> JsonStore {
        JsonStore::load_or_empty(self.config_path(environment))
    }

    pub fn service(&self, environment: &str) -> Result<Service> {
        let config = self.instance_config(environment);
        Service::from_instance_config(&self.processes, &config)
    }

    /// Clears the `running` marker and persists it.
    pub fn mark_stopped(&mut self) -> Result<()> {
        self.local.set("running", Value::Null).save()
    }

    pub fn mark_running(&mut self, environment: &str) -> Result<()> {
        self.local
            .set("running", Value::String(environment.to_string()))
            .save()
    }
}

#[async_trait]
impl InstanceHandle for Instance {
    fn dir(&self) -> &Path {
        &self.dir
    }

    async fn is_running(&self) -> Result<bool> {
        let Some(environment) = self.running_environment() else {
            return Ok(false);
        };
        let service = self.service(environment)?;
        if service.process.is_running(&self.dir).await? {
            return Ok(true);
        }
        warn!(dir = %self.dir.display(), "instance marked running but its process is gone");
        let mut local = JsonStore::load(self.local.path())?;
        local.set("running", Value::Null).save()?;
        Ok(false)
    }
}
