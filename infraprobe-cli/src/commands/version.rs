//! `infraprobe version` command handler

use std::io::Write;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use infraprobe_core::config::InfraprobeConfig;

use crate::commands::{base_dir, driver};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `version` command.
///
/// Fails with a version error when `terraform.min_version` is set and not met.
pub async fn execute(
    config: &InfraprobeConfig,
    cancel: CancellationToken,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let version = driver(config, cancel)?.version(&base_dir(config)).await?;

    writer.render(&VersionReport {
        infraprobe: env!("CARGO_PKG_VERSION").to_owned(),
        binary: config.terraform.binary.clone(),
        version: version.to_string(),
        min_version: config.terraform.min_version.clone(),
    })
}

/// Version report.
#[derive(Serialize)]
pub struct VersionReport {
    pub infraprobe: String,
    pub binary: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
}

impl Render for VersionReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "infraprobe {}", self.infraprobe)?;
        write!(w, "{} {}", self.binary, self.version.bold())?;
        if let Some(ref min) = self.min_version {
            write!(w, " ({} >= {min})", "ok".green())?;
        }
        writeln!(w)?;
        Ok(())
    }
}
