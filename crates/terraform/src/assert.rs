//! 실행 결과 검증
//!
//! [`check`]는 기대 조건이 맞지 않으면 [`AssertionError`]를 반환하고,
//! [`assert_that`]은 테스트 안에서 바로 실패(panic)시킵니다.
//!
//! ```ignore
//! use infraprobe_terraform::assert::{Expectation, assert_that};
//!
//! let plan = env.plan().await?;
//! assert_that(&plan, &Expectation::Success);
//! assert_that(&plan, &Expectation::OutputContains("terraform_data.server".into()));
//! ```

use std::fmt;

use infraprobe_core::error::AssertionError;
use infraprobe_core::metrics as m;
use infraprobe_core::types::ExecutionResult;
use tracing::debug;

/// 기대 조건
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// 종료 코드 0
    Success,
    /// 0이 아닌 종료 코드
    Failure,
    /// 특정 종료 코드
    ExitCode(i32),
    /// stdout에 부분 문자열 포함
    StdoutContains(String),
    /// stderr에 부분 문자열 포함
    StderrContains(String),
    /// stdout 또는 stderr에 부분 문자열 포함
    OutputContains(String),
    /// 어느 스트림에도 부분 문자열이 없음
    OutputNotContains(String),
}

impl Expectation {
    /// 결과가 조건을 만족하는지 확인합니다.
    pub fn is_met(&self, result: &ExecutionResult) -> bool {
        match self {
            Self::Success => result.exit_code == 0,
            Self::Failure => result.exit_code != 0,
            Self::ExitCode(code) => result.exit_code == *code,
            Self::StdoutContains(needle) => result.stdout.contains(needle.as_str()),
            Self::StderrContains(needle) => result.stderr.contains(needle.as_str()),
            Self::OutputContains(needle) => {
                result.stdout.contains(needle.as_str()) || result.stderr.contains(needle.as_str())
            }
            Self::OutputNotContains(needle) => {
                !result.stdout.contains(needle.as_str()) && !result.stderr.contains(needle.as_str())
            }
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "exit code 0"),
            Self::Failure => write!(f, "a non-zero exit code"),
            Self::ExitCode(code) => write!(f, "exit code {code}"),
            Self::StdoutContains(needle) => write!(f, "stdout containing {needle:?}"),
            Self::StderrContains(needle) => write!(f, "stderr containing {needle:?}"),
            Self::OutputContains(needle) => write!(f, "output containing {needle:?}"),
            Self::OutputNotContains(needle) => write!(f, "output not containing {needle:?}"),
        }
    }
}

/// 조건을 검사합니다. 만족하면 아무 효과도 없습니다.
pub fn check(result: &ExecutionResult, expectation: &Expectation) -> Result<(), AssertionError> {
    if expectation.is_met(result) {
        debug!(command = %result.command_line(), expectation = %expectation, "expectation met");
        return Ok(());
    }

    metrics::counter!(m::ASSERTION_FAILURES_TOTAL).increment(1);
    Err(AssertionError {
        expected: expectation.to_string(),
        command: result.command_line(),
        exit_code: result.exit_code,
        output: result.output_report(),
    })
}

/// 조건을 순서대로 검사하고 처음 실패한 조건을 반환합니다.
pub fn check_all(
    result: &ExecutionResult,
    expectations: &[Expectation],
) -> Result<(), AssertionError> {
    expectations.iter().try_for_each(|e| check(result, e))
}

/// 조건이 맞지 않으면 현재 테스트를 실패시킵니다.
#[track_caller]
pub fn assert_that(result: &ExecutionResult, expectation: &Expectation) {
    if let Err(e) = check(result, expectation) {
        panic!("{e}");
    }
}

/// 종료 코드 0을 요구합니다.
#[track_caller]
pub fn assert_success(result: &ExecutionResult) {
    assert_that(result, &Expectation::Success);
}

/// 출력에 부분 문자열이 있어야 합니다.
#[track_caller]
pub fn assert_output_contains(result: &ExecutionResult, needle: &str) {
    assert_that(result, &Expectation::OutputContains(needle.to_owned()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn result(exit_code: i32, stdout: &str, stderr: &str) -> ExecutionResult {
        ExecutionResult {
            program: "terraform".to_owned(),
            args: vec!["plan".to_owned()],
            working_dir: PathBuf::from("fixtures/basic"),
            exit_code,
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn success_and_failure() {
        assert!(check(&result(0, "", ""), &Expectation::Success).is_ok());
        assert!(check(&result(1, "", ""), &Expectation::Success).is_err());
        assert!(check(&result(1, "", ""), &Expectation::Failure).is_ok());
        assert!(check(&result(0, "", ""), &Expectation::Failure).is_err());
        assert!(check(&result(2, "", ""), &Expectation::ExitCode(2)).is_ok());
    }

    #[test]
    fn stream_specific_containment() {
        let r = result(0, "Plan: 1 to add", "Warning: deprecated");
        assert!(check(&r, &Expectation::StdoutContains("1 to add".into())).is_ok());
        assert!(check(&r, &Expectation::StdoutContains("deprecated".into())).is_err());
        assert!(check(&r, &Expectation::StderrContains("deprecated".into())).is_ok());
        assert!(check(&r, &Expectation::OutputContains("deprecated".into())).is_ok());
        assert!(check(&r, &Expectation::OutputNotContains("Error".into())).is_ok());
        assert!(check(&r, &Expectation::OutputNotContains("Warning".into())).is_err());
    }

    #[test]
    fn failure_message_is_descriptive() {
        let err = check(
            &result(1, "", "Error: No value for required variable"),
            &Expectation::Success,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected exit code 0"));
        assert!(msg.contains("`terraform plan`"));
        assert!(msg.contains("got exit code 1"));
        assert!(msg.contains("No value for required variable"));
    }

    #[test]
    fn check_all_reports_first_failure() {
        let r = result(0, "ok", "");
        let err = check_all(
            &r,
            &[
                Expectation::Success,
                Expectation::StdoutContains("missing".into()),
                Expectation::Failure,
            ],
        )
        .unwrap_err();
        assert!(err.expected.contains("missing"));
    }

    #[test]
    fn assert_that_is_silent_on_success() {
        assert_success(&result(0, "", ""));
        assert_output_contains(&result(0, "", "needle"), "needle");
    }

    #[test]
    #[should_panic(expected = "expected exit code 0")]
    fn assert_that_panics_on_failure() {
        assert_success(&result(1, "", "boom"));
    }
}
