use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use crate::doctor::{builtin_checks, run_checks, CheckContext, CheckOutcome, InstanceHandle};
use crate::instance::check_valid_install;
use crate::system::System;
use crate::ui::Ui;

#[derive(Debug, Clone, Default, Args)]
pub struct DoctorArgs {
    /// Only run checks belonging to this category (e.g. `start`)
    pub category: Option<String>,
}

pub async fn execute_doctor(system: &System, args: &DoctorArgs, ui: Ui) -> Result<()> {
    let cwd = env::current_dir().context("reading working directory")?;
    let results = run_doctor(system, &cwd, args.category.as_deref(), ui).await?;
    let skipped = results
        .iter()
        .filter(|(_, outcome)| matches!(outcome, CheckOutcome::Skipped(_)))
        .count();
    ui.log(&format!(
        "{} checks run, {} skipped",
        results.len(),
        skipped
    ));
    Ok(())
}

/// Runs the built-in checks. The instance is only attached when `cwd` is an install.
pub async fn run_doctor(
    system: &System,
    cwd: &Path,
    category: Option<&str>,
    ui: Ui,
) -> Result<Vec<(&'static str, CheckOutcome)>> {
    let instance: Option<Arc<dyn InstanceHandle>> = match check_valid_install("doctor", cwd) {
        Ok(()) => Some(Arc::new(system.instance(cwd)?)),
        Err(_) => None,
    };
    let ctx = CheckContext {
        instance,
        environment: system.environment.clone(),
        options: system.options.clone(),
    };
    run_checks(&builtin_checks(), &ctx, category, &ui).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::commands::testing::{install, system};
    use crate::error::ConfigError;
    use crate::process::testing::RecordingProcess;

    #[tokio::test]
    async fn skips_config_check_outside_an_install() {
        let dir = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let system = system(home.path(), Arc::new(RecordingProcess::default()));

        let results = run_doctor(&system, dir.path(), None, Ui::new(true))
            .await
            .unwrap();
        assert_eq!(
            results,
            vec![("Validating config", CheckOutcome::skipped("Instance not set"))]
        );
    }

    #[tokio::test]
    async fn reports_config_errors_for_an_install() {
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let dir = install(&root, "blog", json!({}));
        std::fs::write(
            dir.join("config.production.json"),
            r#"{"url": "my-ghost-blog.com"}"#,
        )
        .unwrap();
        let system = system(home.path(), Arc::new(RecordingProcess::default()));

        let err = run_doctor(&system, &dir, Some("start"), Ui::new(true))
            .await
            .unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert!(config_err.message.starts_with("Invalid URL"));
        assert_eq!(config_err.environment, "production");
    }

    #[tokio::test]
    async fn stale_marker_with_malformed_config_reports_config_error() {
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let dir = install(&root, "blog", json!({"running": "production"}));
        std::fs::write(dir.join("config.production.json"), "{ nope").unwrap();
        let system = system(home.path(), Arc::new(RecordingProcess::default()));

        let err = run_doctor(&system, &dir, None, Ui::new(true))
            .await
            .unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert_eq!(config_err.message, "Config file is not valid JSON");
        assert_eq!(config_err.environment, "production");
    }

    #[tokio::test]
    async fn unknown_category_runs_nothing() {
        let root = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let dir = install(&root, "blog", json!({}));
        let system = system(home.path(), Arc::new(RecordingProcess::default()));

        let results = run_doctor(&system, &dir, Some("install"), Ui::new(true))
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
