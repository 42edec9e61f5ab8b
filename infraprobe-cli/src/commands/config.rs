//! `infraprobe config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use infraprobe_core::config::InfraprobeConfig;
use infraprobe_core::types::VarValue;
use infraprobe_terraform::runner::REDACTED;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Execute the config validate subcommand.
///
/// Besides parsing and value checks, every fixture directory must exist.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match InfraprobeConfig::load(config_path).await {
        Ok(config) => missing_fixture_dirs(&config),
        Err(e) => vec![e.to_string()],
    };

    let report = ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

fn missing_fixture_dirs(config: &InfraprobeConfig) -> Vec<String> {
    config
        .fixtures
        .keys()
        .filter_map(|name| match config.fixture_dir(name) {
            Ok(dir) if dir.is_dir() => None,
            Ok(dir) => Some(format!(
                "fixture '{name}': directory does not exist: {}",
                dir.display()
            )),
            Err(e) => Some(e.to_string()),
        })
        .collect()
}

/// Execute the config show subcommand.
///
/// Loads and displays the effective configuration (file + env overrides + defaults).
/// Values of sensitive fixture variables are redacted.
///
/// # Errors
///
/// Returns `CliError::Core` if loading fails or `CliError::Command` if section name is invalid.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let mut config = InfraprobeConfig::load(config_path).await?;
    redact_sensitive_vars(&mut config);

    let config_toml = match section.as_deref() {
        None => to_toml(&config),
        Some("general") => to_toml(&config.general),
        Some("terraform") => to_toml(&config.terraform),
        Some("fixtures") => to_toml(&config.fixtures),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, terraform, fixtures)"
            )));
        }
    };

    writer.render(&ConfigReport {
        source: config_path.display().to_string(),
        section,
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {e})"))
}

/// Replace the values of every variable listed in a fixture's `sensitive_vars`.
fn redact_sensitive_vars(config: &mut InfraprobeConfig) {
    for fixture in config.fixtures.values_mut() {
        for name in &fixture.sensitive_vars {
            if let Some(value) = fixture.vars.get_mut(name) {
                *value = VarValue::String(REDACTED.to_owned());
            }
        }
    }
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration (sensitive values redacted)
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{section}]");
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
