//! ghostctl: manage local Ghost installations.
//!
//! This is the entry point of the application. It parses command-line
//! arguments, sets up logging, loads the ghostctl home directory and
//! dispatches to the selected command.

mod commands;
mod doctor;
mod error;
mod instance;
mod logging;
mod options;
mod package;
mod process;
mod settings;
mod store;
mod system;
mod ui;

use std::process::ExitCode;

use anyhow::Result;
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::commands::{DepsArgs, DoctorArgs, ServiceArgs, StartArgs, StopArgs};
use crate::system::System;
use crate::ui::Ui;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "ghostctl",
    version,
    about = "Manage local Ghost installations",
    styles = help_styles(),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbosity: u8,
    /// Only log errors.
    #[arg(long, global = true)]
    silent: bool,
    /// Environment whose config file is used.
    #[arg(
        short,
        long,
        global = true,
        env = "GHOSTCTL_ENV",
        default_value = "production"
    )]
    environment: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the Ghost instance in the current directory.
    Start(StartArgs),
    /// Stop the Ghost instance in the current directory, or all of them.
    Stop(StopArgs),
    /// Run a process manager command for the current instance.
    Service(ServiceArgs),
    /// Check the current instance for common problems.
    Doctor(DoctorArgs),
    /// Install production dependencies of the current release.
    Deps(DepsArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(logging::derive_level(cli.verbosity, cli.silent));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", error::describe(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let system = System::load(cli.environment)?;
    debug!(home = %system.home.display(), environment = %system.environment, "loaded system");
    let ui = Ui::new(cli.silent);

    match &cli.command {
        Commands::Start(args) => commands::execute_start(&system, args, ui).await,
        Commands::Stop(args) => commands::execute_stop(&system, args, ui).await,
        Commands::Service(args) => commands::execute_service(&system, args).await,
        Commands::Doctor(args) => commands::execute_doctor(&system, args, ui).await,
        Commands::Deps(args) => commands::execute_deps(&system, args, ui).await,
    }
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}
