//! Progress output for long-running steps.
//!
//! `Ui::run` wraps a future with a spinner line on stderr and finishes it
//! with a ✔/✖ marker. In quiet mode the future is simply awaited.

use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::tty::IsTty;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_INTERVAL: Duration = Duration::from_millis(80);

#[derive(Debug, Clone, Copy)]
pub struct Ui {
    quiet: bool,
}

impl Ui {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn quiet(&self) -> Self {
        Self { quiet: true }
    }

    /// Awaits `task`, showing `title` as a progress line unless quiet.
    pub async fn run<T, F>(&self, title: &str, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.quiet {
            return task.await;
        }

        let interactive = io::stderr().is_tty();
        if !interactive {
            eprintln!("{title}...");
            let result = task.await;
            finish(title, result.is_ok(), false);
            return result;
        }

        tokio::pin!(task);
        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        let mut frame = 0usize;
        let result = loop {
            tokio::select! {
                result = &mut task => break result,
                _ = ticker.tick() => {
                    draw_frame(FRAMES[frame % FRAMES.len()], title);
                    frame += 1;
                }
            }
        };
        finish(title, result.is_ok(), true);
        result
    }

    /// Prints a line to stdout unless quiet.
    pub fn log(&self, message: &str) {
        if !self.quiet {
            println!("{message}");
        }
    }
}

fn draw_frame(frame: &str, title: &str) {
    let mut stderr = io::stderr();
    let _ = queue!(
        stderr,
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        SetForegroundColor(Color::Cyan),
        Print(frame),
        ResetColor,
        Print(format!(" {title}")),
    );
    let _ = stderr.flush();
}

fn finish(title: &str, ok: bool, interactive: bool) {
    let mut stderr = io::stderr();
    let (marker, color) = if ok { ("✔", Color::Green) } else { ("✖", Color::Red) };
    if interactive {
        let _ = queue!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine));
    }
    let _ = queue!(
        stderr,
        SetForegroundColor(color),
        Print(marker),
        ResetColor,
        Print(format!(" {title}\n")),
    );
    let _ = stderr.flush();
}
