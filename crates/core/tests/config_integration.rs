//! infraprobe.toml 통합 설정 테스트
//!
//! - infraprobe.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use infraprobe_core::config::InfraprobeConfig;
use infraprobe_core::error::{ConfigError, InfraprobeError};
use infraprobe_core::types::VarValue;
use serial_test::serial;

const EXAMPLE: &str = include_str!("../../../infraprobe.toml.example");

// =============================================================================
// infraprobe.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = InfraprobeConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.terraform.binary, "terraform");
    assert_eq!(config.terraform.max_retries, 2);
    assert_eq!(config.terraform.retryable_errors.len(), 3);
    assert_eq!(config.terraform.min_version.as_deref(), Some("1.4.0"));
}

#[test]
fn example_config_passes_validation() {
    let config = InfraprobeConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_defines_basic_fixture() {
    let config = InfraprobeConfig::parse(EXAMPLE).expect("should parse");
    let basic = config.fixture("basic").expect("basic fixture should exist");

    assert_eq!(basic.dir, "fixtures/basic");
    assert!(!basic.apply);
    assert_eq!(basic.vars["server_ip"], VarValue::from("10.0.0.1"));
    assert_eq!(
        basic.vars["ssh_private_key"],
        VarValue::from("dummy-key-for-testing")
    );
    assert_eq!(basic.sensitive_vars, vec!["ssh_private_key"]);
}

#[test]
fn example_config_apply_fixture_has_map_var() {
    let config = InfraprobeConfig::parse(EXAMPLE).expect("should parse");
    let fixture = config.fixture("basic-apply").expect("should exist");

    assert!(fixture.apply);
    assert!(matches!(fixture.vars["tags"], VarValue::Map(_)));
}

#[test]
fn example_fixture_dir_exists_relative_to_workspace() {
    let mut config = InfraprobeConfig::parse(EXAMPLE).expect("should parse");
    config.base_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    let dir = config.fixture_dir("basic").expect("should resolve");
    assert!(dir.join("main.tf").is_file(), "{} should contain main.tf", dir.display());
}

// =============================================================================
// 부분 설정
// =============================================================================

#[test]
fn partial_config_fills_defaults() {
    let config = InfraprobeConfig::parse(
        r#"
[terraform]
binary = "tofu"
"#,
    )
    .expect("should parse");

    assert_eq!(config.terraform.binary, "tofu");
    assert_eq!(config.terraform.step_timeout_secs, 600);
    assert_eq!(config.general.log_level, "info");
    assert!(config.fixtures.is_empty());
}

#[test]
fn empty_file_is_valid() {
    let config = InfraprobeConfig::parse("").expect("empty config should parse");
    config.validate().expect("defaults should validate");
}

#[test]
fn malformed_toml_is_parse_error() {
    let err = InfraprobeConfig::parse("[terraform\nbinary = ").unwrap_err();
    assert!(matches!(
        err,
        InfraprobeError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_is_parse_error() {
    let err = InfraprobeConfig::parse("[terraform]\nmax_retries = \"three\"\n").unwrap_err();
    assert!(matches!(
        err,
        InfraprobeError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 환경변수 우선순위
// =============================================================================

#[tokio::test]
#[serial]
async fn env_overrides_take_precedence_over_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("infraprobe.toml");
    std::fs::write(&path, EXAMPLE).expect("write config");

    // SAFETY: serial 테스트로 환경변수 경쟁 없음
    unsafe {
        std::env::set_var("INFRAPROBE_GENERAL_LOG_LEVEL", "debug");
        std::env::set_var("INFRAPROBE_TERRAFORM_STEP_TIMEOUT_SECS", "30");
    }

    let result = InfraprobeConfig::load(&path).await;

    unsafe {
        std::env::remove_var("INFRAPROBE_GENERAL_LOG_LEVEL");
        std::env::remove_var("INFRAPROBE_TERRAFORM_STEP_TIMEOUT_SECS");
    }

    let config = result.expect("config should load");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.terraform.step_timeout_secs, 30);
    // 파일 값은 유지
    assert_eq!(config.terraform.max_retries, 2);
}

#[tokio::test]
#[serial]
async fn invalid_env_override_fails_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("infraprobe.toml");
    std::fs::write(&path, "").expect("write config");

    unsafe {
        std::env::set_var("INFRAPROBE_GENERAL_LOG_LEVEL", "loud");
    }

    let result = InfraprobeConfig::load(&path).await;

    unsafe {
        std::env::remove_var("INFRAPROBE_GENERAL_LOG_LEVEL");
    }

    let err = result.expect_err("invalid log level must be rejected");
    assert!(err.to_string().contains("log_level"));
}
