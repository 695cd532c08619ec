use std::env;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::warn;

use crate::error::ProcessError;
use crate::instance::check_valid_install;
use crate::package::{Observer, PackageManager, RunOptions};
use crate::settings;
use crate::system::System;
use crate::ui::Ui;

/// Directory inside an install holding the active Ghost release.
const CURRENT_DIR: &str = "current";

#[derive(Debug, Clone, Default, Args)]
pub struct DepsArgs {
    /// Stream package manager output as it is produced
    #[arg(long)]
    pub verbose: bool,

    /// Extra arguments for the package manager (after `--`)
    #[arg(last = true)]
    pub args: Vec<String>,
}

pub async fn execute_deps(system: &System, args: &DepsArgs, ui: Ui) -> Result<()> {
    let cwd = env::current_dir().context("reading working directory")?;
    check_valid_install("deps", &cwd)?;
    let manager = PackageManager::new(
        system.settings.package_manager(),
        settings::install_root()?,
    );
    install_dependencies(&manager, &cwd, args, ui).await
}

/// Installs production dependencies of the instance's current release.
pub async fn install_dependencies(
    manager: &PackageManager,
    cwd: &Path,
    args: &DepsArgs,
    ui: Ui,
) -> Result<()> {
    let mut command = vec![
        "install".to_string(),
        "--production".to_string(),
        "--no-emoji".to_string(),
        "--no-progress".to_string(),
    ];
    command.extend(args.args.iter().cloned());
    let options = RunOptions {
        cwd: Some(cwd.join(CURRENT_DIR)),
        env: vec![("NODE_ENV".to_string(), "production".to_string())],
    };

    if args.verbose {
        let stream = manager.observe(&command, &options)?;
        let mut printer = Printer::default();
        stream.subscribe(&mut printer).await;
        return printer.finish();
    }

    ui.run("Installing dependencies", manager.run(&command, &options))
        .await?;
    Ok(())
}

/// Echoes streamed output to stdout and remembers how the run ended.
#[derive(Default)]
struct Printer {
    error: Option<String>,
}

impl Observer for Printer {
    fn next(&mut self, chunk: String) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    }

    fn error(&mut self, error: String) {
        warn!(%error, "package manager failed");
        self.error = Some(error);
    }

    fn complete(&mut self) {}
}

impl Printer {
    fn finish(self) -> Result<()> {
        match self.error {
            Some(error) => Err(ProcessError::new(error).into()),
            None => Ok(()),
        }
    }
}
