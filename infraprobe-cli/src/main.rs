//! infraprobe CLI -- drive infrastructure fixtures through their lifecycle
//!
//! # Usage
//!
//! ```text
//! infraprobe run basic                 # init -> plan -> destroy
//! infraprobe run basic-apply --apply   # init -> plan -> apply -> output -> destroy
//! infraprobe destroy basic             # manual cleanup
//! infraprobe fixtures list
//! infraprobe config validate
//! infraprobe version
//! ```

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use infraprobe_core::config::InfraprobeConfig;
use infraprobe_core::error::{ConfigError, InfraprobeError};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // config 명령은 잘못된 설정도 직접 보고해야 하므로 로드 실패를 바로 반환하지 않음
    let loaded = load_config(&cli.config).await;

    let mut general = loaded
        .as_ref()
        .map(|config| config.general.clone())
        .unwrap_or_default();
    if let Some(level) = cli.log_level {
        general.log_level = level;
    }
    logging::init_tracing(&general)?;
    infraprobe_core::metrics::describe_all();

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Run(args) => commands::run::execute(args, &loaded?, cancel, &writer).await,
        Commands::Destroy(args) => {
            commands::destroy::execute(args, &loaded?, cancel, &writer).await
        }
        Commands::Fixtures(args) => commands::fixtures::execute(args, &loaded?, &writer),
        Commands::Version => commands::version::execute(&loaded?, cancel, &writer).await,
    }
}

/// Load the configuration file.
///
/// A missing file falls back to defaults plus environment overrides,
/// with fixture paths resolved against the current directory.
async fn load_config(path: &Path) -> Result<InfraprobeConfig, CliError> {
    match InfraprobeConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(InfraprobeError::Config(ConfigError::FileNotFound { .. })) => {
            let mut config = InfraprobeConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            config.base_dir = std::env::current_dir()?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

/// Cancel the run on Ctrl-C. Cleanup still runs after cancellation.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run and cleaning up");
            cancel.cancel();
        }
    });
}
