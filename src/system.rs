//! Process-wide state shared by every command of one invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};

use crate::instance::Instance;
use crate::options::OptionRegistry;
use crate::process::ProcessRegistry;
use crate::settings::{self, Settings};
use crate::store::JsonStore;

pub const SYSTEM_STATE_FILE: &str = "config.json";

pub struct System {
    pub home: PathBuf,
    pub settings: Settings,
    /// Environment selected on the command line.
    pub environment: String,
    pub processes: ProcessRegistry,
    pub options: Arc<OptionRegistry>,
}

impl System {
    /// Builds the system from the ghostctl home directory and built-in registries.
    pub fn load(environment: impl Into<String>) -> Result<Self> {
        let home = settings::home_dir()?;
        let settings = settings::load_settings(&home)?;
        let processes = ProcessRegistry::builtin(&settings);
        Ok(Self {
            home,
            settings,
            environment: environment.into(),
            processes,
            options: Arc::new(OptionRegistry::builtin()),
        })
    }

    pub fn with_parts(
        home: impl Into<PathBuf>,
        environment: impl Into<String>,
        processes: ProcessRegistry,
        options: Arc<OptionRegistry>,
    ) -> Self {
        Self {
            home: home.into(),
            settings: Settings::default(),
            environment: environment.into(),
            processes,
            options,
        }
    }

    pub fn system_store(&self) -> Result<JsonStore> {
        JsonStore::load(self.home.join(SYSTEM_STATE_FILE))
    }

    /// Tracked instances as `(name, cwd)` pairs, in file order.
    pub fn instances(&self) -> Result<Vec<(String, PathBuf)>> {
        let store = self.system_store()?;
        let Some(instances) = store.get("instances").and_then(Value::as_object) else {
            return Ok(Vec::new());
        };
        Ok(instances
            .iter()
            .filter_map(|(name, entry)| {
                let cwd = entry.get("cwd")?.as_str()?;
                Some((name.clone(), PathBuf::from(cwd)))
            })
            .collect())
    }

    pub fn add_instance(&self, name: &str, cwd: &Path) -> Result<()> {
        let mut store = self.system_store()?;
        let mut instances = store
            .get("instances")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        instances.insert(
            name.to_string(),
            json!({ "cwd": cwd.to_string_lossy() }),
        );
        store.set("instances", Value::Object(instances)).save()
    }

    pub fn instance(&self, dir: &Path) -> Result<Instance> {
        Instance::load(dir, self.processes.clone())
    }
}
