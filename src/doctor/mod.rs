//! Pre-flight checks.
//!
//! A `Check` is a titled async task tagged with the command categories it
//! guards (e.g. `start`). Checks run sequentially; each either passes, is
//! skipped with a reason, or fails with an error that aborts the run.

mod validate_config;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::options::OptionRegistry;
use crate::ui::Ui;

pub use validate_config::validate_config;

/// What a check needs to know about the instance under inspection.
#[async_trait]
pub trait InstanceHandle: Send + Sync {
    fn dir(&self) -> &Path;

    async fn is_running(&self) -> Result<bool>;
}

pub struct CheckContext {
    pub instance: Option<Arc<dyn InstanceHandle>>,
    pub environment: String,
    pub options: Arc<OptionRegistry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    Skipped(String),
}

impl CheckOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

pub type CheckFuture<'a> = Pin<Box<dyn Future<Output = Result<CheckOutcome>> + Send + 'a>>;

pub struct Check {
    pub title: &'static str,
    pub categories: &'static [&'static str],
    pub task: fn(&CheckContext) -> CheckFuture<'_>,
}

impl Check {
    pub fn in_category(&self, category: &str) -> bool {
        self.categories.contains(&category)
    }
}

pub fn builtin_checks() -> Vec<Check> {
    vec![validate_config::check()]
}

/// Runs checks (optionally filtered by category) in order, stopping at the first failure.
pub async fn run_checks(
    checks: &[Check],
    ctx: &CheckContext,
    category: Option<&str>,
    ui: &Ui,
) -> Result<Vec<(&'static str, CheckOutcome)>> {
    let mut results = Vec::new();
    for check in checks
        .iter()
        .filter(|check| category.map_or(true, |c| check.in_category(c)))
    {
        let outcome = ui.run(check.title, (check.task)(ctx)).await?;
        match &outcome {
            CheckOutcome::Passed => info!(check = check.title, "passed"),
            CheckOutcome::Skipped(reason) => {
                info!(check = check.title, reason = %reason, "skipped");
                ui.log(&format!("  {} skipped: {reason}", check.title));
            }
        }
        results.push((check.title, outcome));
    }
    Ok(results)
}
