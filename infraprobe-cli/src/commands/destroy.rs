//! `infraprobe destroy` command handler

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use infraprobe_core::config::InfraprobeConfig;
use infraprobe_core::types::ExecutionResult;
use infraprobe_terraform::TerraformOptions;

use crate::cli::DestroyArgs;
use crate::commands::{driver, override_vars};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `destroy` command.
///
/// Runs only the destroy step. Used to clean up after `run --skip-destroy`
/// or after an interrupted run whose own cleanup failed.
pub async fn execute(
    args: DestroyArgs,
    config: &InfraprobeConfig,
    cancel: CancellationToken,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let options = override_vars(
        TerraformOptions::from_fixture(config, &args.fixture)?,
        args.vars,
    )
    .build()?;

    info!(fixture = %args.fixture, dir = %options.fixture_dir().display(), "destroying fixture");

    let result = driver(config, cancel)?.destroy(options).await?;
    writer.render(&DestroyReport::new(&args.fixture, &result))?;
    Ok(())
}

/// Result of `infraprobe destroy`.
#[derive(Serialize)]
pub struct DestroyReport {
    pub fixture: String,
    pub fixture_dir: PathBuf,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl DestroyReport {
    fn new(fixture: &str, result: &ExecutionResult) -> Self {
        Self {
            fixture: fixture.to_owned(),
            fixture_dir: result.working_dir.clone(),
            exit_code: result.exit_code,
            duration_ms: result.duration_ms(),
        }
    }
}

impl Render for DestroyReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Fixture: {} ({})",
            self.fixture.bold(),
            self.fixture_dir.display()
        )?;
        writeln!(
            w,
            "  Destroy: {} ({}ms)",
            "DESTROYED".green().bold(),
            self.duration_ms
        )?;
        Ok(())
    }
}
