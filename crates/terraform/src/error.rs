//! 하네스 에러 타입
//!
//! [`HarnessError`]는 프로세스 실행, 라이프사이클 구동, 결과 검증 중 발생하는
//! 모든 에러를 표현합니다. `From<HarnessError> for InfraprobeError` 변환이
//! 구현되어 있어 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use infraprobe_core::error::{
    AssertionError, ConfigError, InfraprobeError, LifecycleError, ProcessError,
};

/// 하네스 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// 실행 옵션 검증 실패
    #[error("invalid options: {field}: {reason}")]
    InvalidOptions {
        /// 문제가 된 옵션 필드
        field: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 픽스처 디렉토리가 존재하지 않음
    #[error("fixture directory does not exist: {0}")]
    FixtureMissing(String),

    /// 설정 조회 실패 (정의되지 않은 픽스처 등)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 외부 프로세스 실행 실패
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// 라이프사이클 단계 실패
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// 기대 조건 불충족
    #[error(transparent)]
    Assertion(#[from] AssertionError),

    /// 주 실패 이후 destroy도 실패
    #[error("{primary} (cleanup also failed: {cleanup})")]
    CleanupFailed {
        /// 원래 발생한 실패
        primary: Box<HarnessError>,
        /// destroy 단계의 실패
        cleanup: Box<HarnessError>,
    },

    /// `output -json` 결과 해석 실패
    #[error("failed to parse outputs: {0}")]
    OutputParse(String),

    /// 버전 확인 실패 (해석 불가 또는 최소 버전 미달)
    #[error("version check failed: {0}")]
    Version(String),

    /// 본문 태스크가 패닉 없이 중단됨
    #[error("run aborted: {0}")]
    Aborted(String),

    /// 파일 시스템 작업 실패 (픽스처 복사 등)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// 주 실패를 반환합니다. `CleanupFailed`가 아니면 자기 자신입니다.
    pub fn primary(&self) -> &HarnessError {
        match self {
            Self::CleanupFailed { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// 취소로 인해 중단되었는지 확인합니다.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.primary(), Self::Process(e) if e.is_cancelled())
    }

    /// 주 실패와 정리 실패를 묶습니다.
    pub(crate) fn with_cleanup(primary: HarnessError, cleanup: HarnessError) -> Self {
        Self::CleanupFailed {
            primary: Box::new(primary),
            cleanup: Box::new(cleanup),
        }
    }
}

impl From<HarnessError> for InfraprobeError {
    fn from(err: HarnessError) -> Self {
        match err {
            HarnessError::InvalidOptions { field, reason } => {
                InfraprobeError::Config(ConfigError::InvalidValue { field, reason })
            }
            HarnessError::FixtureMissing(path) => {
                InfraprobeError::Config(ConfigError::FixtureDirMissing { path })
            }
            HarnessError::Config(e) => InfraprobeError::Config(e),
            HarnessError::Process(e) => InfraprobeError::Process(e),
            HarnessError::Lifecycle(e) => InfraprobeError::Lifecycle(e),
            HarnessError::Assertion(e) => InfraprobeError::Assertion(e),
            HarnessError::CleanupFailed { primary, cleanup } => InfraprobeError::CleanupFailed {
                primary: Box::new((*primary).into()),
                cleanup: Box::new((*cleanup).into()),
            },
            HarnessError::OutputParse(msg) => {
                InfraprobeError::Terraform(format!("failed to parse outputs: {msg}"))
            }
            HarnessError::Version(msg) => {
                InfraprobeError::Terraform(format!("version check failed: {msg}"))
            }
            HarnessError::Aborted(msg) => InfraprobeError::Terraform(format!("run aborted: {msg}")),
            HarnessError::Io(e) => InfraprobeError::Io(e),
        }
    }
}
