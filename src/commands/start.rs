use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::doctor::{builtin_checks, run_checks, CheckContext, InstanceHandle};
use crate::error::SystemError;
use crate::instance::check_valid_install;
use crate::system::System;
use crate::ui::Ui;

#[derive(Debug, Clone, Default, Args)]
pub struct StartArgs {
    /// Do not print progress
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute_start(system: &System, args: &StartArgs, ui: Ui) -> Result<()> {
    let ui = if args.quiet { ui.quiet() } else { ui };
    let cwd = env::current_dir().context("reading working directory")?;
    start_instance(system, &cwd, ui).await
}

/// Runs the `start` checks, starts the instance in the selected environment,
/// then records it as running and tracks it in the system config.
pub async fn start_instance(system: &System, cwd: &Path, ui: Ui) -> Result<()> {
    check_valid_install("start", cwd)?;
    let mut instance = system.instance(cwd)?;
    if instance.is_running().await? {
        return Err(SystemError::new("Ghost is already running.").into());
    }

    let environment = system.environment.clone();
    let handle: Arc<dyn InstanceHandle> = Arc::new(system.instance(cwd)?);
    let ctx = CheckContext {
        instance: Some(handle),
        environment: environment.clone(),
        options: system.options.clone(),
    };
    run_checks(&builtin_checks(), &ctx, Some("start"), &ui).await?;

    let service = instance.service(&environment)?;
    ui.run("Starting Ghost", async {
        service.process.start(cwd, &environment).await?;
        instance.mark_running(&environment)?;
        system.add_instance(&instance.name(), cwd)
    })
    .await?;

    info!(dir = %cwd.display(), environment = %environment, "instance started");
    ui.log(&format!("Ghost is running in {environment} mode"));
    Ok(())
}
