//! Command handlers -- one module per subcommand

pub mod config;
pub mod destroy;
pub mod fixtures;
pub mod run;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use infraprobe_core::config::InfraprobeConfig;
use infraprobe_terraform::{LifecycleDriver, SystemProcessRunner, TerraformOptionsBuilder};

use crate::error::CliError;

/// Build a lifecycle driver backed by the real process runner.
pub(crate) fn driver(
    config: &InfraprobeConfig,
    cancel: CancellationToken,
) -> Result<LifecycleDriver<SystemProcessRunner>, CliError> {
    let driver = LifecycleDriver::new(
        Arc::new(SystemProcessRunner::new()),
        config.terraform.clone(),
    )?;
    Ok(driver.with_cancellation(cancel))
}

/// Apply `--var NAME=VALUE` overrides on top of the configured fixture variables.
pub(crate) fn override_vars(
    mut builder: TerraformOptionsBuilder,
    vars: Vec<(String, String)>,
) -> TerraformOptionsBuilder {
    for (name, value) in vars {
        builder = builder.var(name, value);
    }
    builder
}

/// Directory used for commands that are not tied to a fixture.
pub(crate) fn base_dir(config: &InfraprobeConfig) -> PathBuf {
    if config.base_dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        config.base_dir.clone()
    }
}
