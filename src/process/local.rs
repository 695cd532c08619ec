//! Local process manager: a detached child tracked through a pid file.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::ProcessController;
use crate::error::{ProcessError, SystemError};
use crate::instance::LOCAL_STATE_FILE;
use crate::store::JsonStore;

pub const PID_FILE: &str = ".ghostpid";
pub const LOG_FILE: &str = "ghost.log";
const DEFAULT_START_COMMAND: &str = "node current/index.js";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const KILL_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Term,
    Kill,
}

pub struct LocalProcess {
    stop_timeout: Duration,
    start_grace: Duration,
}

impl LocalProcess {
    pub fn new(stop_timeout: Duration, start_grace: Duration) -> Self {
        Self {
            stop_timeout,
            start_grace,
        }
    }

    fn start_command(cwd: &Path) -> Result<(String, Vec<String>)> {
        let local = JsonStore::load(cwd.join(LOCAL_STATE_FILE))?;
        let raw = local
            .get_str("start_command")
            .unwrap_or(DEFAULT_START_COMMAND);
        let mut parts = shell_words::split(raw)
            .with_context(|| format!("failed to parse start_command '{raw}'"))?;
        if parts.is_empty() {
            return Err(ProcessError::new("start_command is empty").into());
        }
        let program = parts.remove(0);
        Ok((program, parts))
    }
}

#[async_trait]
impl ProcessController for LocalProcess {
    fn name(&self) -> &str {
        "local"
    }

    async fn start(&self, cwd: &Path, environment: &str) -> Result<()> {
        let (program, args) = Self::start_command(cwd)?;
        let log_path = cwd.join(LOG_FILE);
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open {}", log_path.display()))?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(cwd)
            .env("NODE_ENV", environment)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        let pid = child
            .id()
            .ok_or_else(|| ProcessError::new(format!("{program} exited before reporting a pid")))?;
        info!(pid, program = %program, "spawned instance process");

        if let Ok(status) = tokio::time::timeout(self.start_grace, child.wait()).await {
            let status = status?;
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(ProcessError::new(format!(
                "Ghost process exited during startup (code {code}); see {}",
                log_path.display()
            ))
            .into());
        }

        let pid_path = cwd.join(PID_FILE);
        fs::write(&pid_path, pid.to_string())
            .with_context(|| format!("failed to write {}", pid_path.display()))?;
        Ok(())
    }

    async fn stop(&self, cwd: &Path) -> Result<()> {
        let pid_path = cwd.join(PID_FILE);
        let Some(pid) = read_pid(&pid_path) else {
            debug!(dir = %cwd.display(), "no pid file, nothing to stop");
            return Ok(());
        };

        if is_alive(pid) {
            send_os_signal(pid, StopSignal::Term);
            if !wait_for_exit(pid, self.stop_timeout).await {
                warn!(pid, "process ignored SIGTERM, killing");
                send_os_signal(pid, StopSignal::Kill);
                if !wait_for_exit(pid, KILL_WAIT).await {
                    return Err(ProcessError::new(format!("failed to stop process {pid}")).into());
                }
            }
        }

        remove_pid_file(&pid_path);
        Ok(())
    }

    async fn is_running(&self, cwd: &Path) -> Result<bool> {
        let pid_path = cwd.join(PID_FILE);
        let Some(pid) = read_pid(&pid_path) else {
            return Ok(false);
        };
        if is_alive(pid) {
            return Ok(true);
        }
        debug!(pid, "removing stale pid file");
        remove_pid_file(&pid_path);
        Ok(false)
    }

    async fn call_command(&self, cwd: &Path, command: &str, _args: &[String]) -> Result<()> {
        let pid = read_pid(&cwd.join(PID_FILE)).filter(|pid| is_alive(*pid));
        match command {
            "status" => {
                match pid {
                    Some(pid) => println!("running (pid {pid})"),
                    None => println!("stopped"),
                }
                Ok(())
            }
            "pid" => {
                let pid = pid.ok_or_else(|| ProcessError::new("Ghost is not running"))?;
                println!("{pid}");
                Ok(())
            }
            other => Err(SystemError::new(format!(
                "Command '{other}' is not supported by the 'local' process manager"
            ))
            .into()),
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    let raw = fs::read_to_string(path).ok()?;
    raw.trim().parse().ok().filter(|pid| *pid > 0)
}

fn remove_pid_file(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove pid file");
        }
    }
}

async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !is_alive(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 performs the permission and existence checks only.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return !is_zombie(pid);
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: i32) -> bool {
    fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next().map(|s| s == "Z"))
        })
        .unwrap_or(false)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: i32) -> bool {
    false
}

#[cfg(unix)]
fn send_os_signal(pid: u32, signal: StopSignal) {
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    let sig = match signal {
        StopSignal::Term => libc::SIGTERM,
        StopSignal::Kill => libc::SIGKILL,
    };
    debug!(pid, ?signal, "sending signal");
    unsafe {
        let _ = libc::kill(-pid, sig);
        let _ = libc::kill(pid, sig);
    }
}

#[cfg(not(unix))]
fn is_alive(pid: u32) -> bool {
    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn send_os_signal(pid: u32, signal: StopSignal) {
    let mut command = std::process::Command::new("taskkill");
    command.args(["/PID", &pid.to_string(), "/T"]);
    if signal == StopSignal::Kill {
        command.arg("/F");
    }
    let _ = command.status();
}
