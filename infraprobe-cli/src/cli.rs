//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// infraprobe -- drive infrastructure fixtures through init, plan, apply and destroy.
///
/// Use `infraprobe <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "infraprobe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the infraprobe.toml configuration file.
    #[arg(short, long, default_value = "infraprobe.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a fixture through its lifecycle; destroy always runs at the end.
    Run(RunArgs),

    /// Destroy whatever a fixture left behind.
    Destroy(DestroyArgs),

    /// Inspect configured fixtures.
    Fixtures(FixturesArgs),

    /// Manage configuration.
    Config(ConfigArgs),

    /// Show the external binary version and check the configured minimum.
    Version,
}

// ---- run ----

/// Run init, plan and optionally apply for a configured fixture.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Fixture name from the `[fixtures]` table.
    pub fixture: String,

    /// Apply the plan (overrides the fixture's `apply` setting).
    #[arg(long)]
    pub apply: bool,

    /// Bind a variable, overriding the configured value. Repeatable.
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Leave the environment in place instead of destroying it.
    #[arg(long, conflicts_with = "isolate")]
    pub skip_destroy: bool,

    /// Run against a temporary copy of the fixture directory.
    #[arg(long)]
    pub isolate: bool,
}

// ---- destroy ----

/// Run only the destroy step for a configured fixture.
#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Fixture name from the `[fixtures]` table.
    pub fixture: String,

    /// Bind a variable, overriding the configured value. Repeatable.
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

// ---- fixtures ----

/// Inspect configured fixtures.
#[derive(Args, Debug)]
pub struct FixturesArgs {
    #[command(subcommand)]
    pub action: FixturesAction,
}

#[derive(Subcommand, Debug)]
pub enum FixturesAction {
    /// List configured fixtures.
    List,
}

// ---- config ----

/// Manage infraprobe configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, terraform, fixtures).
        #[arg(long)]
        section: Option<String>,
    },
}

/// Parse a `NAME=VALUE` pair. The value may itself contain `=`.
fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}
