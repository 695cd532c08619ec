//! Thin wrapper around the package manager (yarn by default).
//!
//! Every invocation prefers binaries installed under ghostctl's own
//! `node_modules/.bin`, runs from ghostctl's install root unless a cwd is
//! given, and layers caller-supplied environment variables over the current
//! process environment. Output is either collected (`run`) or streamed as
//! text chunks (`observe`).

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::ProcessError;

const READ_BUFFER: usize = 8 * 1024;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory; defaults to the package manager's local directory.
    pub cwd: Option<PathBuf>,
    /// Extra environment, applied over the inherited environment.
    pub env: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct PackageOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl PackageOutput {
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct PackageManager {
    program: String,
    local_dir: PathBuf,
}

impl PackageManager {
    pub fn new(program: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            local_dir: local_dir.into(),
        }
    }

    fn command(&self, args: &[String], options: &RunOptions) -> Result<Command> {
        let inherited_path = options
            .env
            .iter()
            .rev()
            .find(|(key, _)| key == "PATH")
            .map(|(_, value)| OsString::from(value))
            .or_else(|| env::var_os("PATH"))
            .unwrap_or_default();
        let local_bin = self.local_dir.join("node_modules").join(".bin");
        let path = env::join_paths(
            std::iter::once(local_bin).chain(env::split_paths(&inherited_path)),
        )
        .context("failed to build PATH for the package manager")?;

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(options.cwd.as_deref().unwrap_or(&self.local_dir))
            .envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("PATH", path)
            .stdin(Stdio::null());
        Ok(command)
    }

    fn describe(&self, args: &[String]) -> String {
        if args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, args.join(" "))
        }
    }

    /// Runs to completion and returns the collected output.
    pub async fn run(&self, args: &[String], options: &RunOptions) -> Result<PackageOutput> {
        let label = self.describe(args);
        info!(command = %label, "running package manager");
        let output = self
            .command(args, options)?
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.program))?;
        let result = PackageOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        if !result.status.success() {
            return Err(ProcessError::new(format!(
                "`{label}` exited with code {}\n{}",
                result.status.code().unwrap_or(1),
                result.combined().trim_end()
            ))
            .into());
        }
        Ok(result)
    }

    /// Spawns the package manager and streams its stdout as text chunks.
    pub fn observe(&self, args: &[String], options: &RunOptions) -> Result<ChunkStream> {
        let label = self.describe(args);
        info!(command = %label, "streaming package manager output");
        let mut child = self
            .command(args, options)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;
        let stdout = child
            .stdout
            .take()
            .context("package manager stdout was not captured")?;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump(child, stdout, tx, label));
        Ok(ChunkStream { rx, done: false })
    }
}

/// One event of an observed run. `Complete` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Next(String),
    Complete,
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }
}

/// Consumer side of `ChunkStream::subscribe`.
pub trait Observer {
    fn next(&mut self, chunk: String);
    fn error(&mut self, error: String);
    fn complete(&mut self);
}

/// Single-subscription stream of stdout chunks ending in exactly one terminal event.
pub struct ChunkStream {
    rx: mpsc::Receiver<StreamEvent>,
    done: bool,
}

impl ChunkStream {
    /// Next event, or `None` once a terminal event has been delivered.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        let event = self
            .rx
            .recv()
            .await
            .unwrap_or_else(|| StreamEvent::Error("output stream closed unexpectedly".to_string()));
        if event.is_terminal() {
            self.done = true;
            self.rx.close();
        }
        Some(event)
    }

    /// Drives the stream to its end, forwarding every event to `observer`.
    pub async fn subscribe<O: Observer>(mut self, observer: &mut O) {
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Next(chunk) => observer.next(chunk),
                StreamEvent::Error(error) => observer.error(error),
                StreamEvent::Complete => observer.complete(),
            }
        }
    }
}

async fn pump(
    mut child: Child,
    mut stdout: ChildStdout,
    tx: mpsc::Sender<StreamEvent>,
    label: String,
) {
    // Drain stderr separately so a full pipe never blocks the child.
    let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(read_all(stderr)));

    let mut decoder = Utf8Chunker::default();
    let mut buf = vec![0u8; READ_BUFFER];
    let mut read_error = None;
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Some(text) = decoder.push(&buf[..n]) {
                    // A dropped receiver just means nobody is listening any more.
                    let _ = tx.send(StreamEvent::Next(text)).await;
                }
            }
            Err(err) => {
                read_error = Some(err.to_string());
                break;
            }
        }
    }
    if let Some(text) = decoder.finish() {
        let _ = tx.send(StreamEvent::Next(text)).await;
    }

    let status = child.wait().await;
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    let terminal = match (status, read_error) {
        (Err(err), _) => StreamEvent::Error(format!("failed to wait for {label}: {err}")),
        (Ok(_), Some(err)) => StreamEvent::Error(format!("failed to read output of {label}: {err}")),
        (Ok(status), None) if status.success() => StreamEvent::Complete,
        (Ok(status), None) => StreamEvent::Error(format!(
            "`{label}` exited with code {}\n{}",
            status.code().unwrap_or(1),
            stderr.trim_end()
        )),
    };
    debug!(command = %label, ?terminal, "package manager finished");
    let _ = tx.send(terminal).await;
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut bytes = Vec::new();
    let _ = reader.read_to_end(&mut bytes).await;
    String::from_utf8_lossy(&bytes).to_string()
}

/// Decodes UTF-8 incrementally, holding back a trailing partial sequence.
#[derive(Debug, Default)]
struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        (!out.is_empty()).then_some(out)
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).to_string();
        self.pending.clear();
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunker_holds_back_split_sequences() {
        let mut chunker = Utf8Chunker::default();
        let bytes = "héllo".as_bytes();
        // 'é' is two bytes starting at index 1.
        assert_eq!(chunker.push(&bytes[..2]), Some("h".to_string()));
        assert_eq!(chunker.push(&bytes[2..]), Some("éllo".to_string()));
        assert_eq!(chunker.finish(), None);
    }

    #[test]
    fn chunker_replaces_invalid_bytes() {
        let mut chunker = Utf8Chunker::default();
        assert_eq!(chunker.push(b"a\xffb"), Some("a\u{fffd}b".to_string()));
        assert_eq!(chunker.push(b"\xe2\x82"), None);
        assert_eq!(chunker.finish(), Some("\u{fffd}".to_string()));
    }

    #[test]
    fn combined_output_joins_streams() {
        let output = PackageOutput {
            status: exit_status(0),
            stdout: "out".to_string(),
            stderr: "err\n".to_string(),
        };
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(windows)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(code as u32)
    }
}
