use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, warn};

use crate::error::SystemError;
use crate::instance::check_valid_install;
use crate::system::System;
use crate::ui::Ui;

#[derive(Debug, Clone, Default, Args)]
pub struct StopArgs {
    /// Stop every tracked instance, one after another
    #[arg(short, long)]
    pub all: bool,

    /// Do not print progress
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute_stop(system: &System, args: &StopArgs, ui: Ui) -> Result<()> {
    let ui = if args.quiet { ui.quiet() } else { ui };
    if args.all {
        return stop_all(system, ui).await;
    }
    let cwd = env::current_dir().context("reading working directory")?;
    stop_instance(system, &cwd, ui).await
}

/// Stops the instance installed in `cwd` and clears its `running` marker.
///
/// The marker is only cleared once the process manager reports success.
pub async fn stop_instance(system: &System, cwd: &Path, ui: Ui) -> Result<()> {
    check_valid_install("stop", cwd)?;
    let mut instance = system.instance(cwd)?;
    if !instance.local().has("running") {
        return Err(SystemError::new("No running Ghost instance found here.").into());
    }
    let environment = instance
        .running_environment()
        .unwrap_or(&system.environment)
        .to_string();
    let service = instance.service(&environment)?;
    debug!(dir = %cwd.display(), process = service.process.name(), "stopping instance");

    ui.run("Stopping Ghost", async {
        service.process.stop(cwd).await?;
        instance.mark_stopped()
    })
    .await
}

/// Stops every tracked instance in system-config order.
///
/// Each stop runs from inside the instance directory. The first failure
/// aborts the loop; the original working directory is restored either way.
pub async fn stop_all(system: &System, ui: Ui) -> Result<()> {
    let instances = system.instances()?;
    let _restore = CwdGuard::capture()?;

    for (name, dir) in instances {
        env::set_current_dir(&dir)
            .with_context(|| format!("entering instance directory {}", dir.display()))?;
        let cwd = env::current_dir().context("reading working directory")?;
        ui.run(
            &format!("Stopping Ghost: {name}"),
            stop_instance(system, &cwd, ui.quiet()),
        )
        .await?;
    }
    Ok(())
}

/// Puts the process back in the directory it was in when captured.
struct CwdGuard {
    original: PathBuf,
}

impl CwdGuard {
    fn capture() -> Result<Self> {
        Ok(Self {
            original: env::current_dir().context("reading working directory")?,
        })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        if let Err(err) = env::set_current_dir(&self.original) {
            warn!(dir = %self.original.display(), %err, "failed to restore working directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::commands::testing::{install, system, CWD_LOCK};
    use crate::instance::LOCAL_STATE_FILE;
    use crate::process::testing::RecordingProcess;
    use crate::store::JsonStore;

    fn marker(dir: &Path) -> Option<String> {
        JsonStore::load(dir.join(LOCAL_STATE_FILE))
            .unwrap()
            .get_str("running")
            .map(str::to_string)
    }

    #[tokio::test]
    async fn refuses_outside_an_install() {
        let dir = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let system = system(home.path(), Arc::new(RecordingProcess::default()));

        let err = stop_instance(&system, dir.path(), Ui::new(true))
            .await
            .unwrap_err();
        let system_err = err.downcast_ref::<SystemError>().unwrap();
        assert!(system_err.message.contains("not a recognisable Ghost installation"));
        assert!(system_err.message.contains("ghostctl stop"));
    }

    #[tokio::test]
    async fn refuses_when_nothing_is_running() {
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let dir = install(&root, "blog", json!({"name": "blog"}));
        let process = Arc::new(RecordingProcess::default());
        let system = system(home.path(), process.clone());

        let err = stop_instance(&system, &dir, Ui::new(true)).await.unwrap_err();
        let system_err = err.downcast_ref::<SystemError>().unwrap();
        assert_eq!(system_err.message, "No running Ghost instance found here.");
        assert!(process.stopped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stops_and_clears_marker() {
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let dir = install(&root, "blog", json!({"name": "blog", "running": "production"}));
        let process = Arc::new(RecordingProcess::default());
        let system = system(home.path(), process.clone());

        stop_instance(&system, &dir, Ui::new(true)).await.unwrap();

        assert_eq!(*process.stopped.lock().unwrap(), vec![dir.clone()]);
        assert_eq!(marker(&dir), None);
    }

    #[tokio::test]
    async fn failed_stop_keeps_marker() {
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let dir = install(&root, "blog", json!({"running": "production"}));
        let process = Arc::new(RecordingProcess {
            fail_stop_in: Some(dir.clone()),
            ..Default::default()
        });
        let system = system(home.path(), process.clone());

        let err = stop_instance(&system, &dir, Ui::new(true)).await.unwrap_err();
        assert!(err.to_string().contains("stop failed"));
        assert_eq!(marker(&dir).as_deref(), Some("production"));
    }

    #[tokio::test]
    async fn malformed_config_falls_back_to_local_process() {
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let dir = install(&root, "blog", json!({"running": "production"}));
        std::fs::write(dir.join("config.production.json"), "{ nope").unwrap();
        let process = Arc::new(RecordingProcess::default());
        let system = system(home.path(), process.clone());

        stop_instance(&system, &dir, Ui::new(true)).await.unwrap();

        assert_eq!(*process.stopped.lock().unwrap(), vec![dir.clone()]);
        assert_eq!(marker(&dir), None);
        let config = std::fs::read_to_string(dir.join("config.production.json")).unwrap();
        assert_eq!(config, "{ nope");
    }

    #[tokio::test]
    async fn running_environment_selects_process_manager() {
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let dir = install(&root, "blog", json!({"running": "staging"}));
        std::fs::write(dir.join("config.staging.json"), r#"{"process": "systemd"}"#).unwrap();
        let process = Arc::new(RecordingProcess::default());
        let system = system(home.path(), process.clone());

        let err = stop_instance(&system, &dir, Ui::new(true)).await.unwrap_err();
        let system_err = err.downcast_ref::<SystemError>().unwrap();
        assert!(system_err.message.contains("systemd"));
        assert!(process.stopped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_all_stops_each_instance_in_order_and_restores_cwd() {
        let _lock = CWD_LOCK.lock().await;
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let a = install(&root, "a", json!({"running": "production"}));
        let b = install(&root, "b", json!({"running": "production"}));
        let c = install(&root, "c", json!({"running": "development"}));
        let process = Arc::new(RecordingProcess::default());
        let system = system(home.path(), process.clone());
        system.add_instance("zeta", &b).unwrap();
        system.add_instance("alpha", &a).unwrap();
        system.add_instance("mid", &c).unwrap();

        let before = env::current_dir().unwrap();
        stop_all(&system, Ui::new(true)).await.unwrap();

        assert_eq!(env::current_dir().unwrap(), before);
        assert_eq!(
            *process.stopped.lock().unwrap(),
            vec![b.clone(), a.clone(), c.clone()]
        );
        for dir in [&a, &b, &c] {
            assert_eq!(marker(dir), None);
        }
    }

    #[tokio::test]
    async fn stop_all_aborts_on_first_failure_and_restores_cwd() {
        let _lock = CWD_LOCK.lock().await;
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let a = install(&root, "a", json!({"running": "production"}));
        let b = install(&root, "b", json!({"running": "production"}));
        let c = install(&root, "c", json!({"running": "production"}));
        let process = Arc::new(RecordingProcess {
            fail_stop_in: Some(b.clone()),
            ..Default::default()
        });
        let system = system(home.path(), process.clone());
        for (name, dir) in [("a", &a), ("b", &b), ("c", &c)] {
            system.add_instance(name, dir).unwrap();
        }

        let before = env::current_dir().unwrap();
        let err = stop_all(&system, Ui::new(true)).await.unwrap_err();

        assert!(err.to_string().contains("stop failed"));
        assert_eq!(env::current_dir().unwrap(), before);
        assert_eq!(*process.stopped.lock().unwrap(), vec![a.clone()]);
        assert_eq!(marker(&a), None);
        assert_eq!(marker(&b).as_deref(), Some("production"));
        assert_eq!(marker(&c).as_deref(), Some("production"));
    }

    #[tokio::test]
    async fn stop_all_fails_on_instance_that_is_not_running() {
        let _lock = CWD_LOCK.lock().await;
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let a = install(&root, "a", json!({}));
        let b = install(&root, "b", json!({"running": "production"}));
        let process = Arc::new(RecordingProcess::default());
        let system = system(home.path(), process.clone());
        system.add_instance("a", &a).unwrap();
        system.add_instance("b", &b).unwrap();

        let before = env::current_dir().unwrap();
        let err = stop_all(&system, Ui::new(true)).await.unwrap_err();

        let system_err = err.downcast_ref::<SystemError>().unwrap();
        assert_eq!(system_err.message, "No running Ghost instance found here.");
        assert_eq!(env::current_dir().unwrap(), before);
        assert!(process.stopped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_all_with_no_instances_is_a_no_op() {
        let _lock = CWD_LOCK.lock().await;
        let home = TempDir::new().unwrap();
        let process = Arc::new(RecordingProcess::default());
        let system = system(home.path(), process.clone());

        stop_all(&system, Ui::new(true)).await.unwrap();
        assert!(process.stopped.lock().unwrap().is_empty());
    }
}
