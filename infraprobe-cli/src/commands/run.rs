//! `infraprobe run` command handler

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use infraprobe_core::config::{FixtureConfig, InfraprobeConfig};
use infraprobe_core::error::AssertionError;
use infraprobe_core::types::{ExecutionResult, LifecycleStep};
use infraprobe_terraform::assert::{Expectation, check};
use infraprobe_terraform::{
    Environment, HarnessError, LifecycleReport, ProcessRunner, TerraformOptions,
};

use crate::cli::RunArgs;
use crate::commands::{driver, override_vars};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
///
/// Runs init, plan and (when requested) apply for the fixture, checks the
/// fixture's declared expectations against the plan step, and destroys the
/// environment unless `--skip-destroy` is given. The report is rendered
/// on both success and failure.
pub async fn execute(
    args: RunArgs,
    config: &InfraprobeConfig,
    cancel: CancellationToken,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let fixture = config.fixture(&args.fixture).map_err(HarnessError::from)?.clone();

    let mut builder = override_vars(
        TerraformOptions::from_fixture(config, &args.fixture)?,
        args.vars,
    );
    if args.apply {
        builder = builder.apply(true);
    }
    let mut options = builder.build()?;

    // 임시 복사본은 실행이 끝날 때까지 유지되어야 함
    let scratch = if args.isolate {
        let dir = tempfile::tempdir()?;
        options = options.isolated_in(dir.path())?;
        info!(dir = %options.fixture_dir().display(), "running against isolated copy");
        Some(dir)
    } else {
        None
    };

    let driver = driver(config, cancel)?;
    if config.terraform.min_version.is_some() {
        driver.version(options.fixture_dir()).await?;
    }

    info!(
        fixture = %args.fixture,
        dir = %options.fixture_dir().display(),
        apply = options.apply(),
        vars = ?options.redacted_vars(),
        "running fixture"
    );

    let (report, result, kept) = if args.skip_destroy {
        let env = driver.environment(options)?;
        let result = match env.provision().await {
            Ok(()) => verify(&env, &fixture).await,
            Err(e) => Err(e),
        };
        env.leave_in_place();
        (env.report(), result, true)
    } else {
        let body_fixture = fixture.clone();
        let run = driver
            .run_scoped(options, move |env| async move {
                verify(&env, &body_fixture).await
            })
            .await;
        (run.report, run.result, false)
    };

    let result = accept_expected_plan_failure(result, &fixture);
    let report = RunReport::new(&args.fixture, report, kept, &result);
    writer.render(&report)?;
    drop(scratch);

    if kept {
        warn!(
            fixture = %args.fixture,
            "resources left in place, run `infraprobe destroy {}` to clean up",
            args.fixture
        );
    }

    result.map(|_| ()).map_err(CliError::from)
}

/// Check fixture expectations after the forward steps, and collect outputs when applied.
async fn verify<R: ProcessRunner>(
    env: &Environment<R>,
    fixture: &FixtureConfig,
) -> Result<Option<BTreeMap<String, serde_json::Value>>, HarnessError> {
    if let Some(record) = env.report().step(LifecycleStep::Plan) {
        check_plan(&record.result, fixture)?;
    }
    if env.options().apply() {
        let outputs = env.output().await?;
        return Ok(Some(outputs.redacted()));
    }
    Ok(None)
}

/// Check the plan result against `expect_plan_exit_code` and `expect_output_contains`.
fn check_plan(result: &ExecutionResult, fixture: &FixtureConfig) -> Result<(), AssertionError> {
    if let Some(code) = fixture.expect_plan_exit_code {
        check(result, &Expectation::ExitCode(code))?;
    }
    for needle in &fixture.expect_output_contains {
        check(result, &Expectation::OutputContains(needle.clone()))?;
    }
    Ok(())
}

/// A plan that fails with exactly the declared exit code is the expected outcome.
///
/// Only applies when cleanup succeeded; a cleanup failure is still reported.
fn accept_expected_plan_failure(
    result: Result<Option<BTreeMap<String, serde_json::Value>>, HarnessError>,
    fixture: &FixtureConfig,
) -> Result<Option<BTreeMap<String, serde_json::Value>>, HarnessError> {
    match result {
        Err(HarnessError::Lifecycle(e))
            if e.step == LifecycleStep::Plan
                && fixture.expect_plan_exit_code == Some(e.result.exit_code) =>
        {
            info!(exit_code = e.result.exit_code, "plan failed as expected");
            check_plan(&e.result, fixture)?;
            Ok(None)
        }
        other => other,
    }
}

/// One executed step in the run report.
#[derive(Serialize)]
pub struct StepSummary {
    pub step: LifecycleStep,
    pub exit_code: i32,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Result of `infraprobe run`.
#[derive(Serialize)]
pub struct RunReport {
    pub fixture: String,
    pub run_id: String,
    pub fixture_dir: PathBuf,
    pub steps: Vec<StepSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_has_changes: Option<bool>,
    pub destroyed: bool,
    pub left_in_place: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, serde_json::Value>>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    fn new(
        fixture: &str,
        report: LifecycleReport,
        left_in_place: bool,
        result: &Result<Option<BTreeMap<String, serde_json::Value>>, HarnessError>,
    ) -> Self {
        let steps = report
            .steps
            .iter()
            .map(|record| StepSummary {
                step: record.step,
                exit_code: record.result.exit_code,
                attempts: record.attempts,
                duration_ms: record.result.duration_ms(),
            })
            .collect();
        let (outputs, error) = match result {
            Ok(outputs) => (outputs.clone(), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            fixture: fixture.to_owned(),
            run_id: report.run_id,
            fixture_dir: report.fixture_dir,
            steps,
            plan_has_changes: report.plan_has_changes,
            destroyed: report.destroyed,
            left_in_place,
            outputs,
            passed: result.is_ok(),
            error,
        }
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Fixture: {} ({})",
            self.fixture.bold(),
            self.fixture_dir.display()
        )?;
        writeln!(w, "Run ID: {}", self.run_id)?;
        writeln!(w)?;

        if self.steps.is_empty() {
            writeln!(w, "  (no steps executed)")?;
        }
        for step in &self.steps {
            let status = if step.exit_code == 0 {
                "ok".green()
            } else {
                format!("exit {}", step.exit_code).red()
            };
            write!(
                w,
                "  {:<8} {:<10} {:>8}ms",
                step.step.as_str(),
                status,
                step.duration_ms
            )?;
            if step.attempts > 1 {
                write!(w, "  ({} attempts)", step.attempts)?;
            }
            writeln!(w)?;
        }

        if let Some(changes) = self.plan_has_changes {
            writeln!(w)?;
            writeln!(w, "  Plan has changes: {changes}")?;
        }

        if let Some(ref outputs) = self.outputs
            && !outputs.is_empty()
        {
            writeln!(w)?;
            writeln!(w, "  Outputs:")?;
            for (name, value) in outputs {
                match value.as_str() {
                    Some(s) => writeln!(w, "    {name} = {s}")?,
                    None => writeln!(w, "    {name} = {value}")?,
                }
            }
        }

        writeln!(w)?;
        if self.left_in_place {
            writeln!(w, "  Cleanup: {}", "SKIPPED (left in place)".yellow())?;
        } else if self.destroyed {
            writeln!(w, "  Cleanup: {}", "DESTROYED".green())?;
        } else {
            writeln!(w, "  Cleanup: {}", "FAILED".red())?;
        }

        if self.passed {
            writeln!(w, "  Result: {}", "PASSED".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "FAILED".red().bold())?;
            if let Some(ref error) = self.error {
                writeln!(w)?;
                writeln!(w, "{}", error.red())?;
            }
        }

        Ok(())
    }
}
