use anyhow::Result;
use tracing::debug;

use super::{Check, CheckContext, CheckFuture, CheckOutcome};
use crate::error::ConfigError;
use crate::instance::config_file_name;
use crate::store::{is_truthy, lookup, read_json_if_valid};

pub const TITLE: &str = "Validating config";

pub fn check() -> Check {
    Check {
        title: TITLE,
        categories: &["start"],
        task: run,
    }
}

fn run(ctx: &CheckContext) -> CheckFuture<'_> {
    Box::pin(validate_config(ctx))
}

/// Checks that `config.<env>.json` parses and that every set, validatable
/// option passes its validator. Validators run one at a time in registry
/// order and the first failure is reported.
pub async fn validate_config(ctx: &CheckContext) -> Result<CheckOutcome> {
    let Some(instance) = &ctx.instance else {
        return Ok(CheckOutcome::skipped("Instance not set"));
    };

    if instance.is_running().await? {
        return Ok(CheckOutcome::skipped("Instance is currently running"));
    }

    let path = instance.dir().join(config_file_name(&ctx.environment));
    let Some(config) = read_json_if_valid(&path) else {
        return Err(
            ConfigError::new("Config file is not valid JSON", ctx.environment.as_str())
                .with_task(TITLE)
                .into(),
        );
    };

    for descriptor in ctx.options.validatable() {
        let Some(validator) = &descriptor.validator else {
            continue;
        };
        let key = descriptor.key();
        let Some(value) = lookup(&config, key).filter(|value| is_truthy(value)) else {
            continue;
        };

        debug!(key, option = descriptor.description, "validating option");
        if let Err(message) = validator.validate(value).await {
            return Err(ConfigError::new(message, ctx.environment.as_str())
                .with_task(TITLE)
                .with_entry(key, value.clone())
                .into());
        }
    }

    Ok(CheckOutcome::Passed)
}
