//! 에러 타입: 하네스 전 영역의 에러 분류
//!
//! - [`ProcessError`]: 외부 바이너리 실행 자체가 실패한 경우 (바이너리 없음, 작업 디렉토리 없음 등)
//! - [`LifecycleError`]: 라이프사이클 단계가 0이 아닌 종료 코드를 반환한 경우
//! - [`AssertionError`]: 기대 조건이 충족되지 않은 경우
//! - [`ConfigError`]: 설정 파일 로딩/검증 실패

use std::time::Duration;

use crate::types::{ExecutionResult, LifecycleStep};

/// infraprobe 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum InfraprobeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 프로세스 실행 에러
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// 라이프사이클 단계 실패
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// 기대 조건 불충족
    #[error("assertion error: {0}")]
    Assertion(#[from] AssertionError),

    /// 주 실패 이후 정리(destroy)까지 실패한 경우
    ///
    /// 주 실패가 항상 먼저 보고되며, 정리 실패는 보조 정보로만 붙습니다.
    #[error("{primary} (cleanup also failed: {cleanup})")]
    CleanupFailed {
        /// 원래 발생한 실패
        primary: Box<InfraprobeError>,
        /// destroy 단계의 실패
        cleanup: Box<InfraprobeError>,
    },

    /// terraform 출력 해석 실패 등 기타 도구 에러
    #[error("terraform error: {0}")]
    Terraform(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 설정에 정의되지 않은 픽스처
    #[error("fixture not found: {name}")]
    FixtureNotFound { name: String },

    /// 픽스처 디렉토리가 존재하지 않음
    #[error("fixture directory does not exist: {path}")]
    FixtureDirMissing { path: String },
}

/// 외부 프로세스 실행 에러
///
/// 프로세스가 실행되어 0이 아닌 코드로 종료한 경우는 여기에 포함되지 않습니다.
/// 그 경우는 [`LifecycleError`]가 담당합니다.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// 실행 파일을 찾을 수 없음
    #[error("binary not found: {program}")]
    BinaryNotFound { program: String },

    /// 작업 디렉토리가 존재하지 않음
    #[error("working directory does not exist: {path}")]
    WorkingDirMissing { path: String },

    /// 프로세스 시작 실패 (권한 등)
    #[error("failed to launch '{program}': {reason}")]
    LaunchFailed { program: String, reason: String },

    /// 제한 시간 초과로 종료됨
    #[error("'{program}' timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// 취소 요청으로 종료됨
    #[error("'{program}' was cancelled")]
    Cancelled { program: String },

    /// 출력 수집 실패
    #[error("failed to collect output of '{program}': {reason}")]
    Output { program: String, reason: String },
}

impl ProcessError {
    /// 취소로 인한 에러인지 확인합니다.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// 라이프사이클 단계 실패
///
/// 실패한 단계의 실행 결과(stdout/stderr 포함)를 그대로 보존합니다.
#[derive(Debug, thiserror::Error)]
#[error(
    "{step} failed with exit code {} after {attempts} attempt(s){}",
    .result.exit_code,
    .result.output_report()
)]
pub struct LifecycleError {
    /// 실패한 단계
    pub step: LifecycleStep,
    /// 마지막 시도의 실행 결과
    pub result: ExecutionResult,
    /// 시도 횟수 (재시도 포함)
    pub attempts: u32,
}

impl LifecycleError {
    /// 실패한 단계의 stdout 또는 stderr에 `needle`이 포함되는지 확인합니다.
    pub fn output_contains(&self, needle: &str) -> bool {
        self.result.stdout.contains(needle) || self.result.stderr.contains(needle)
    }
}

/// 기대 조건 불충족
#[derive(Debug, Clone, thiserror::Error)]
#[error("expected {expected} from `{command}`, got exit code {exit_code}{output}")]
pub struct AssertionError {
    /// 기대 조건 설명
    pub expected: String,
    /// 검사 대상 명령줄
    pub command: String,
    /// 실제 종료 코드
    pub exit_code: i32,
    /// 캡처된 출력 (진단용)
    pub output: String,
}
