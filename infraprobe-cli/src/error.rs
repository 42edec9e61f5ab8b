//! CLI-specific error types and exit code mapping

use infraprobe_core::error::{InfraprobeError, ProcessError};
use infraprobe_terraform::HarnessError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from infraprobe-core.
    #[error("{0}")]
    Core(#[from] InfraprobeError),

    /// Lifecycle, process or assertion failure from the harness.
    #[error("{0}")]
    Harness(#[from] HarnessError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                 |
    /// |------|-----------------------------------------|
    /// | 0    | Success                                 |
    /// | 1    | General / command error                 |
    /// | 2    | Configuration error                     |
    /// | 3    | Lifecycle step failed                   |
    /// | 4    | Expectation not met                     |
    /// | 5    | External binary could not be executed   |
    /// | 10   | IO error                                |
    /// | 130  | Cancelled (Ctrl-C)                      |
    ///
    /// When cleanup also failed, the code reflects the primary failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) => 1,
            Self::Core(e) => core_exit_code(e),
            Self::Harness(e) => harness_exit_code(e.primary()),
        }
    }
}

fn process_exit_code(e: &ProcessError) -> i32 {
    if e.is_cancelled() { 130 } else { 5 }
}

fn core_exit_code(e: &InfraprobeError) -> i32 {
    match e {
        InfraprobeError::Config(_) => 2,
        InfraprobeError::Lifecycle(_) => 3,
        InfraprobeError::Assertion(_) => 4,
        InfraprobeError::Process(p) => process_exit_code(p),
        InfraprobeError::CleanupFailed { primary, .. } => core_exit_code(primary),
        InfraprobeError::Io(_) => 10,
        InfraprobeError::Terraform(_) => 1,
    }
}

fn harness_exit_code(e: &HarnessError) -> i32 {
    match e {
        HarnessError::InvalidOptions { .. }
        | HarnessError::FixtureMissing(_)
        | HarnessError::Config(_) => 2,
        HarnessError::Lifecycle(_) => 3,
        HarnessError::Assertion(_) => 4,
        HarnessError::Process(p) => process_exit_code(p),
        HarnessError::Io(_) => 10,
        HarnessError::CleanupFailed { primary, .. } => harness_exit_code(primary),
        HarnessError::OutputParse(_) | HarnessError::Version(_) | HarnessError::Aborted(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraprobe_core::error::{AssertionError, ConfigError, LifecycleError};
    use infraprobe_core::types::{ExecutionResult, LifecycleStep};
    use std::time::Duration;

    fn failed(step: LifecycleStep) -> LifecycleError {
        LifecycleError {
            step,
            result: ExecutionResult {
                program: "terraform".to_owned(),
                args: vec![step.as_str().to_owned()],
                working_dir: std::path::PathBuf::from("."),
                exit_code: 1,
                stdout: String::new(),
                stderr: "boom".to_owned(),
                duration: Duration::ZERO,
            },
            attempts: 1,
        }
    }

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_lifecycle_error() {
        let err = CliError::Harness(HarnessError::Lifecycle(failed(LifecycleStep::Plan)));
        assert_eq!(err.exit_code(), 3, "lifecycle error should return exit code 3");
    }

    #[test]
    fn test_exit_code_assertion_error() {
        let err = CliError::Harness(HarnessError::Assertion(AssertionError {
            expected: "exit code 0".to_owned(),
            command: "terraform plan".to_owned(),
            exit_code: 1,
            output: String::new(),
        }));
        assert_eq!(err.exit_code(), 4, "assertion error should return exit code 4");
    }

    #[test]
    fn test_exit_code_process_errors() {
        let missing = CliError::Harness(HarnessError::Process(ProcessError::BinaryNotFound {
            program: "terraform".to_owned(),
        }));
        assert_eq!(missing.exit_code(), 5);

        let cancelled = CliError::Harness(HarnessError::Process(ProcessError::Cancelled {
            program: "terraform".to_owned(),
        }));
        assert_eq!(cancelled.exit_code(), 130);
    }

    #[test]
    fn test_exit_code_uses_primary_when_cleanup_failed() {
        let err = CliError::Harness(HarnessError::CleanupFailed {
            primary: Box::new(HarnessError::Lifecycle(failed(LifecycleStep::Plan))),
            cleanup: Box::new(HarnessError::Process(ProcessError::Timeout {
                program: "terraform".to_owned(),
                timeout: Duration::from_secs(1),
            })),
        });
        assert_eq!(err.exit_code(), 3, "primary failure decides the exit code");
    }

    #[test]
    fn test_exit_code_fixture_missing() {
        let err = CliError::Harness(HarnessError::FixtureMissing("/nope".to_owned()));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("test error".to_owned());
        assert_eq!(err.exit_code(), 1, "command error should return exit code 1");
    }

    #[test]
    fn test_exit_code_core_errors() {
        let err = CliError::Core(InfraprobeError::Config(ConfigError::FixtureNotFound {
            name: "basic".to_owned(),
        }));
        assert_eq!(err.exit_code(), 2);

        let err = CliError::Core(InfraprobeError::Lifecycle(failed(LifecycleStep::Init)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(format!("{}", err), "execution failed");
    }

    #[test]
    fn test_error_display_harness_is_transparent() {
        let err = CliError::Harness(HarnessError::FixtureMissing("/nope".to_owned()));
        assert_eq!(err.to_string(), "fixture directory does not exist: /nope");
    }
}
