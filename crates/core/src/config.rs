//! 설정 관리: infraprobe.toml 파싱 및 런타임 설정
//!
//! [`InfraprobeConfig`]는 로깅, 외부 바이너리 실행 방식, 픽스처 목록을 담는
//! 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`INFRAPROBE_TERRAFORM_BINARY=tofu` 형식)
//! 3. 설정 파일 (`infraprobe.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), infraprobe_core::error::InfraprobeError> {
//! use infraprobe_core::config::InfraprobeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = InfraprobeConfig::load("infraprobe.toml").await?;
//! let fixture_dir = config.fixture_dir("basic")?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = InfraprobeConfig::parse("[terraform]\nbinary = \"tofu\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, InfraprobeError};
use crate::types::VarValue;

/// 단계별 제한 시간 상한 (24시간)
const MAX_STEP_TIMEOUT_SECS: u64 = 86_400;
/// 재시도 상한
const MAX_RETRIES: u32 = 10;
/// 재시도 백오프 상한 (밀리초)
const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// infraprobe 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraprobeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 외부 IaC 바이너리 실행 설정
    #[serde(default)]
    pub terraform: TerraformConfig,
    /// 이름별 픽스처 정의
    #[serde(default)]
    pub fixtures: BTreeMap<String, FixtureConfig>,
    /// 상대 경로 픽스처의 기준 디렉토리 (설정 파일이 있는 디렉토리)
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl InfraprobeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, InfraprobeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, InfraprobeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InfraprobeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                InfraprobeError::Io(e)
            }
        })?;
        let mut config = Self::parse(&content)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, InfraprobeError> {
        toml::from_str(toml_str).map_err(|e| {
            InfraprobeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `INFRAPROBE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "INFRAPROBE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "INFRAPROBE_GENERAL_LOG_FORMAT");

        // Terraform
        override_string(&mut self.terraform.binary, "INFRAPROBE_TERRAFORM_BINARY");
        override_bool(&mut self.terraform.no_color, "INFRAPROBE_TERRAFORM_NO_COLOR");
        override_u64(
            &mut self.terraform.step_timeout_secs,
            "INFRAPROBE_TERRAFORM_STEP_TIMEOUT_SECS",
        );
        override_u32(
            &mut self.terraform.max_retries,
            "INFRAPROBE_TERRAFORM_MAX_RETRIES",
        );
        override_opt_string(
            &mut self.terraform.min_version,
            "INFRAPROBE_TERRAFORM_MIN_VERSION",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), InfraprobeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.terraform.validate()?;

        for (name, fixture) in &self.fixtures {
            fixture.validate(name)?;
        }

        Ok(())
    }

    /// 이름으로 픽스처 정의를 찾습니다.
    pub fn fixture(&self, name: &str) -> Result<&FixtureConfig, ConfigError> {
        self.fixtures
            .get(name)
            .ok_or_else(|| ConfigError::FixtureNotFound {
                name: name.to_owned(),
            })
    }

    /// 픽스처 디렉토리를 기준 디렉토리 기준으로 해석합니다.
    ///
    /// 디렉토리의 존재 여부는 확인하지 않습니다.
    pub fn fixture_dir(&self, name: &str) -> Result<PathBuf, ConfigError> {
        let fixture = self.fixture(name)?;
        Ok(resolve_path(&self.base_dir, &fixture.dir))
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 외부 IaC 바이너리 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformConfig {
    /// 실행 파일 이름 또는 경로 (terraform, tofu 등)
    pub binary: String,
    /// `-no-color` 전달 여부
    pub no_color: bool,
    /// plan/apply/destroy 시 상태 잠금 사용 여부 (`-lock=`)
    pub lock: bool,
    /// init 시 프로바이더 업그레이드 여부 (`-upgrade=`)
    pub upgrade: bool,
    /// 단계별 제한 시간 (초, 0이면 무제한)
    pub step_timeout_secs: u64,
    /// 재시도 가능한 에러에 대한 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 백오프 기본 간격 (밀리초, 시도 횟수에 비례해 증가)
    pub retry_backoff_ms: u64,
    /// 재시도 대상으로 판단할 출력 패턴 (정규식)
    pub retryable_errors: Vec<String>,
    /// plan에 `-detailed-exitcode`를 전달할지 여부 (종료 코드 2 = 변경 있음)
    pub detailed_exitcode: bool,
    /// `-parallelism=` 값
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
    /// 요구하는 최소 바이너리 버전 (semver)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: "terraform".to_owned(),
            no_color: true,
            lock: false,
            upgrade: false,
            step_timeout_secs: 600,
            max_retries: 0,
            retry_backoff_ms: 1_000,
            retryable_errors: Vec::new(),
            detailed_exitcode: false,
            parallelism: None,
            min_version: None,
        }
    }
}

impl TerraformConfig {
    /// 실행 설정의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), InfraprobeError> {
        if self.binary.trim().is_empty() {
            return Err(invalid("terraform.binary", "must not be empty".to_owned()));
        }

        if self.step_timeout_secs > MAX_STEP_TIMEOUT_SECS {
            return Err(invalid(
                "terraform.step_timeout_secs",
                format!("must be 0-{MAX_STEP_TIMEOUT_SECS}"),
            ));
        }

        if self.max_retries > MAX_RETRIES {
            return Err(invalid(
                "terraform.max_retries",
                format!("must be 0-{MAX_RETRIES}"),
            ));
        }

        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(invalid(
                "terraform.retry_backoff_ms",
                format!("must be 0-{MAX_RETRY_BACKOFF_MS}"),
            ));
        }

        for pattern in &self.retryable_errors {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(invalid(
                    "terraform.retryable_errors",
                    format!("invalid pattern '{pattern}': {e}"),
                ));
            }
        }

        if self.parallelism == Some(0) {
            return Err(invalid(
                "terraform.parallelism",
                "must be at least 1".to_owned(),
            ));
        }

        if let Some(ref min_version) = self.min_version
            && let Err(e) = semver::Version::parse(min_version)
        {
            return Err(invalid(
                "terraform.min_version",
                format!("'{min_version}' is not a valid version: {e}"),
            ));
        }

        Ok(())
    }

    /// 단계별 제한 시간을 `Duration`으로 반환합니다 (0이면 `None`).
    pub fn step_timeout(&self) -> Option<std::time::Duration> {
        (self.step_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.step_timeout_secs))
    }
}

/// 픽스처 정의
///
/// 하나의 테스트 대상 설정 디렉토리와 그에 바인딩할 변수들입니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// 픽스처 디렉토리 (설정 파일 기준 상대 경로 허용)
    pub dir: String,
    /// 변수 바인딩 (`-var name=value`)
    #[serde(default)]
    pub vars: BTreeMap<String, VarValue>,
    /// 변수 파일 (`-var-file=`), 픽스처 디렉토리 기준
    #[serde(default)]
    pub var_files: Vec<String>,
    /// 외부 프로세스에 추가로 전달할 환경변수
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// init 시 전달할 백엔드 설정 (`-backend-config=key=value`)
    #[serde(default)]
    pub backend_config: BTreeMap<String, String>,
    /// plan 이후 apply까지 수행할지 여부
    #[serde(default)]
    pub apply: bool,
    /// 로그와 출력에서 값을 가릴 변수 이름
    #[serde(default)]
    pub sensitive_vars: Vec<String>,
    /// plan 단계에 기대하는 종료 코드
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_plan_exit_code: Option<i32>,
    /// plan 출력에 포함되어야 하는 문자열
    #[serde(default)]
    pub expect_output_contains: Vec<String>,
}

impl FixtureConfig {
    /// 픽스처 정의의 유효성을 검증합니다.
    pub fn validate(&self, name: &str) -> Result<(), InfraprobeError> {
        if self.dir.trim().is_empty() {
            return Err(invalid(
                &format!("fixtures.{name}.dir"),
                "must not be empty".to_owned(),
            ));
        }

        for var_name in self.vars.keys() {
            if !is_valid_identifier(var_name) {
                return Err(invalid(
                    &format!("fixtures.{name}.vars"),
                    format!("'{var_name}' is not a valid variable name"),
                ));
            }
        }

        for var_name in &self.sensitive_vars {
            if !is_valid_identifier(var_name) {
                return Err(invalid(
                    &format!("fixtures.{name}.sensitive_vars"),
                    format!("'{var_name}' is not a valid variable name"),
                ));
            }
        }

        if let Some(code) = self.expect_plan_exit_code
            && !(0..=255).contains(&code)
        {
            return Err(invalid(
                &format!("fixtures.{name}.expect_plan_exit_code"),
                "must be 0-255".to_owned(),
            ));
        }

        Ok(())
    }
}

/// HCL 식별자 규칙: 문자 또는 `_`로 시작, 이후 문자/숫자/`_`/`-`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// `base` 기준으로 경로를 해석합니다. 절대 경로는 그대로 둡니다.
pub fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

fn invalid(field: &str, reason: String) -> InfraprobeError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = if val.is_empty() { None } else { Some(val) };
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
