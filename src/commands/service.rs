use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use crate::instance::check_valid_install;
use crate::system::System;

#[derive(Debug, Clone, Args)]
pub struct ServiceArgs {
    /// Process manager command to run (e.g. `status`, `logs`)
    pub command: String,

    /// Arguments passed through to the command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

pub async fn execute_service(system: &System, args: &ServiceArgs) -> Result<()> {
    let cwd = env::current_dir().context("reading working directory")?;
    call_service_command(system, &cwd, &args.command, &args.args).await
}

/// Forwards `command` to the process manager configured for this instance.
///
/// The running environment wins over the one selected on the command line.
pub async fn call_service_command(
    system: &System,
    cwd: &Path,
    command: &str,
    args: &[String],
) -> Result<()> {
    check_valid_install("service", cwd)?;
    let instance = system.instance(cwd)?;
    let environment = instance
        .running_environment()
        .unwrap_or(&system.environment)
        .to_string();
    let service = instance.service(&environment)?;
    debug!(command, process = service.process.name(), %environment, "calling service command");
    service.call_command(cwd, command, args).await
}
