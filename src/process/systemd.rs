//! systemd process manager: delegates to `systemctl` for a `ghost_<name>` unit.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ProcessController;
use crate::error::{ProcessError, SystemError};
use crate::instance::LOCAL_STATE_FILE;
use crate::store::JsonStore;

pub struct SystemdProcess {
    systemctl: String,
    journalctl: String,
}

impl SystemdProcess {
    pub fn new() -> Self {
        Self {
            systemctl: "systemctl".to_string(),
            journalctl: "journalctl".to_string(),
        }
    }
}

impl Default for SystemdProcess {
    fn default() -> Self {
        Self::new()
    }
}

/// Unit name derived from the instance's `name`, or its directory name.
pub fn unit_name(cwd: &Path) -> Result<String> {
    let local = JsonStore::load(cwd.join(LOCAL_STATE_FILE))?;
    let name = match local.get_str("name") {
        Some(name) => name.to_string(),
        None => cwd
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("instance directory has no name")?,
    };
    Ok(format!("ghost_{}", name.replace('.', "-")))
}

async fn run_checked(program: &str, args: &[&str]) -> Result<()> {
    debug!(program, ?args, "running");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to spawn {program}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProcessError::new(format!(
            "`{program} {}` failed: {}",
            args.join(" "),
            stderr.trim()
        ))
        .into());
    }
    Ok(())
}

#[async_trait]
impl ProcessController for SystemdProcess {
    fn name(&self) -> &str {
        "systemd"
    }

    async fn start(&self, cwd: &Path, _environment: &str) -> Result<()> {
        let unit = unit_name(cwd)?;
        run_checked(&self.systemctl, &["start", &unit]).await
    }

    async fn stop(&self, cwd: &Path) -> Result<()> {
        let unit = unit_name(cwd)?;
        run_checked(&self.systemctl, &["stop", &unit]).await
    }

    async fn is_running(&self, cwd: &Path) -> Result<bool> {
        let unit = unit_name(cwd)?;
        let status = Command::new(&self.systemctl)
            .args(["is-active", "--quiet", &unit])
            .stdin(Stdio::null())
            .status()
            .await
            .with_context(|| format!("failed to spawn {}", self.systemctl))?;
        Ok(status.success())
    }

    async fn call_command(&self, cwd: &Path, command: &str, args: &[String]) -> Result<()> {
        let unit = unit_name(cwd)?;
        let mut cmd = match command {
            "status" => {
                let mut cmd = Command::new(&self.systemctl);
                cmd.args(["status", "--no-pager", &unit]);
                cmd
            }
            "logs" => {
                let mut cmd = Command::new(&self.journalctl);
                cmd.args(["-u", &unit]);
                cmd
            }
            other => {
                return Err(SystemError::new(format!(
                    "Command '{other}' is not supported by the 'systemd' process manager"
                ))
                .into())
            }
        };
        cmd.args(args);
        let status = cmd.status().await.context("failed to run service command")?;
        if !status.success() {
            return Err(ProcessError::new(format!(
                "service command '{command}' exited with {}",
                status.code().unwrap_or(1)
            ))
            .into());
        }
        Ok(())
    }
}
