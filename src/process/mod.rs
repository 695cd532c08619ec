//! Process supervision.
//!
//! A `ProcessController` knows how to start, stop and query an instance that
//! lives in a given directory. Controllers are looked up by name (the
//! `process` key of the instance config) through a `ProcessRegistry`, and a
//! `Service` binds one of them to a loaded instance config.

mod local;
mod systemd;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::SystemError;
use crate::settings::Settings;
use crate::store::JsonStore;

pub use local::LocalProcess;
pub use systemd::SystemdProcess;

pub const DEFAULT_PROCESS: &str = "local";

/// Drives the process backing an instance directory.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Name under which this controller is registered.
    fn name(&self) -> &str;

    async fn start(&self, cwd: &Path, environment: &str) -> Result<()>;

    async fn stop(&self, cwd: &Path) -> Result<()>;

    async fn is_running(&self, cwd: &Path) -> Result<bool>;

    /// Runs a controller-specific command such as `status`.
    async fn call_command(&self, cwd: &Path, command: &str, args: &[String]) -> Result<()> {
        let _ = (cwd, args);
        Err(SystemError::new(format!(
            "Command '{}' is not supported by the '{}' process manager",
            command,
            self.name()
        ))
        .into())
    }
}

/// Name → controller table.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    controllers: HashMap<String, Arc<dyn ProcessController>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalProcess::new(
            settings.stop_timeout(),
            settings.start_grace(),
        )));
        registry.register(Arc::new(SystemdProcess::new()));
        registry
    }

    pub fn register(&mut self, controller: Arc<dyn ProcessController>) -> &mut Self {
        self.controllers
            .insert(controller.name().to_string(), controller);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ProcessController>> {
        self.controllers
            .get(name)
            .cloned()
            .ok_or_else(|| SystemError::new(format!("Unknown process manager '{name}'")).into())
    }
}

/// A process controller bound to one instance's configuration.
#[derive(Clone)]
pub struct Service {
    pub process: Arc<dyn ProcessController>,
}

impl Service {
    /// Picks the controller named by the config's `process` key (default: local).
    pub fn from_instance_config(registry: &ProcessRegistry, config: &JsonStore) -> Result<Self> {
        let name = config.get_str("process").unwrap_or(DEFAULT_PROCESS);
        Ok(Self {
            process: registry.get(name)?,
        })
    }

    pub async fn call_command(&self, cwd: &Path, command: &str, args: &[String]) -> Result<()> {
        self.process.call_command(cwd, command, args).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn service_defaults_to_local() {
        let dir = TempDir::new().unwrap();
        let registry = ProcessRegistry::builtin(&Settings::default());
        let config = JsonStore::load(dir.path().join("config.production.json")).unwrap();
        let service = Service::from_instance_config(&registry, &config).unwrap();
        assert_eq!(service.process.name(), "local");
    }

    #[test]
    fn service_picks_configured_process() {
        let dir = TempDir::new().unwrap();
        let registry = ProcessRegistry::builtin(&Settings::default());
        let mut config = JsonStore::load(dir.path().join("config.production.json")).unwrap();
        config.set("process", json!("systemd"));
        let service = Service::from_instance_config(&registry, &config).unwrap();
        assert_eq!(service.process.name(), "systemd");

        config.set("process", json!("pm2"));
        let err = Service::from_instance_config(&registry, &config).err().unwrap();
        assert!(err.downcast_ref::<SystemError>().is_some());
    }

    struct Minimal;

    #[async_trait]
    impl ProcessController for Minimal {
        fn name(&self) -> &str {
            "minimal"
        }

        async fn start(&self, _cwd: &Path, _environment: &str) -> Result<()> {
            Ok(())
        }

        async fn stop(&self, _cwd: &Path) -> Result<()> {
            Ok(())
        }

        async fn is_running(&self, _cwd: &Path) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn unknown_command_is_a_system_error() {
        let dir = TempDir::new().unwrap();
        let err = Minimal
            .call_command(dir.path(), "restart-nginx", &[])
            .await
            .unwrap_err();
        let system = err.downcast_ref::<SystemError>().unwrap();
        assert!(system.message.contains("restart-nginx"));
    }
}
