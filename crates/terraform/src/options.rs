//! 실행 옵션: 픽스처 디렉토리와 변수 바인딩
//!
//! [`TerraformOptions`]는 한 번의 테스트 실행에 필요한 입력을 담습니다.
//! 빌더로 생성하며, 생성 이후에는 변경할 수 없습니다.
//!
//! ```no_run
//! use infraprobe_terraform::TerraformOptions;
//!
//! let options = TerraformOptions::builder("fixtures/basic")
//!     .var("server_ip", "10.0.0.1")
//!     .sensitive_var("ssh_private_key", "dummy-key-for-testing")
//!     .build()?;
//! # Ok::<(), infraprobe_terraform::HarnessError>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use infraprobe_core::config::{InfraprobeConfig, is_valid_identifier};
use infraprobe_core::types::VarValue;

use crate::error::HarnessError;
use crate::runner::REDACTED;
use crate::vars::format_value;

/// 픽스처 복사 시 건너뛸 항목 (이전 실행의 플러그인 캐시와 상태 파일)
const SKIPPED_ENTRIES: &[&str] = &[".terraform", "terraform.tfstate", "terraform.tfstate.backup"];

/// 한 번의 테스트 실행 입력
#[derive(Debug, Clone)]
pub struct TerraformOptions {
    fixture_dir: PathBuf,
    vars: BTreeMap<String, VarValue>,
    var_files: Vec<String>,
    env: BTreeMap<String, String>,
    backend_config: BTreeMap<String, String>,
    apply: bool,
    sensitive_vars: BTreeSet<String>,
}

impl TerraformOptions {
    /// 빌더를 생성합니다.
    pub fn builder(fixture_dir: impl Into<PathBuf>) -> TerraformOptionsBuilder {
        TerraformOptionsBuilder::new(fixture_dir)
    }

    /// 설정 파일의 픽스처 정의로부터 빌더를 생성합니다.
    ///
    /// 반환된 빌더에 CLI 인자 등으로 변수를 덮어쓴 뒤 `build()`합니다.
    pub fn from_fixture(
        config: &InfraprobeConfig,
        name: &str,
    ) -> Result<TerraformOptionsBuilder, HarnessError> {
        let fixture = config.fixture(name)?;
        let dir = config.fixture_dir(name)?;

        let mut builder = TerraformOptionsBuilder::new(dir)
            .vars(fixture.vars.clone())
            .apply(fixture.apply);
        for file in &fixture.var_files {
            builder = builder.var_file(file.clone());
        }
        for (key, value) in &fixture.env {
            builder = builder.env(key.clone(), value.clone());
        }
        for (key, value) in &fixture.backend_config {
            builder = builder.backend_config(key.clone(), value.clone());
        }
        for name in &fixture.sensitive_vars {
            builder = builder.mark_sensitive(name.clone());
        }
        Ok(builder)
    }

    /// 픽스처 디렉토리
    pub fn fixture_dir(&self) -> &Path {
        &self.fixture_dir
    }

    /// 변수 바인딩
    pub fn vars(&self) -> &BTreeMap<String, VarValue> {
        &self.vars
    }

    /// 변수 파일 (픽스처 디렉토리 기준)
    pub fn var_files(&self) -> &[String] {
        &self.var_files
    }

    /// 추가 환경변수
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// 백엔드 설정
    pub fn backend_config(&self) -> &BTreeMap<String, String> {
        &self.backend_config
    }

    /// plan 이후 apply까지 수행하는지 여부
    pub fn apply(&self) -> bool {
        self.apply
    }

    /// 민감한 변수 이름
    pub fn sensitive_vars(&self) -> &BTreeSet<String> {
        &self.sensitive_vars
    }

    /// 로그와 결과에서 가려야 할 값 목록
    pub fn secrets(&self) -> Vec<String> {
        self.sensitive_vars
            .iter()
            .filter_map(|name| self.vars.get(name))
            .map(format_value)
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// 민감한 값이 가려진 변수 목록 (표시용)
    pub fn redacted_vars(&self) -> BTreeMap<String, String> {
        self.vars
            .iter()
            .map(|(name, value)| {
                let shown = if self.sensitive_vars.contains(name) {
                    REDACTED.to_owned()
                } else {
                    format_value(value)
                };
                (name.clone(), shown)
            })
            .collect()
    }

    /// 실행 직전 검증: 픽스처 디렉토리가 여전히 존재하는지 확인합니다.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if !self.fixture_dir.is_dir() {
            return Err(HarnessError::FixtureMissing(
                self.fixture_dir.display().to_string(),
            ));
        }
        for file in &self.var_files {
            let path = self.fixture_dir.join(file);
            if !path.is_file() {
                return Err(HarnessError::InvalidOptions {
                    field: "var_files".to_owned(),
                    reason: format!("{} does not exist", path.display()),
                });
            }
        }
        Ok(())
    }

    /// 픽스처를 `dest` 아래로 복사하고, 복사본을 가리키는 옵션을 반환합니다.
    ///
    /// 이전 실행이 남긴 `.terraform/`과 상태 파일은 복사하지 않으므로
    /// 동시에 실행되는 테스트가 상태를 공유하지 않습니다. 블로킹 I/O입니다.
    pub fn isolated_in(&self, dest: &Path) -> Result<Self, HarnessError> {
        let name = self
            .fixture_dir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "fixture".into());
        let target = dest.join(name);
        copy_fixture_dir(&self.fixture_dir, &target)?;

        let mut isolated = self.clone();
        isolated.fixture_dir = target;
        Ok(isolated)
    }
}

/// [`TerraformOptions`] 빌더
#[derive(Debug, Clone)]
pub struct TerraformOptionsBuilder {
    options: TerraformOptions,
}

impl TerraformOptionsBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new(fixture_dir: impl Into<PathBuf>) -> Self {
        Self {
            options: TerraformOptions {
                fixture_dir: fixture_dir.into(),
                vars: BTreeMap::new(),
                var_files: Vec::new(),
                env: BTreeMap::new(),
                backend_config: BTreeMap::new(),
                apply: false,
                sensitive_vars: BTreeSet::new(),
            },
        }
    }

    /// 변수를 바인딩합니다. 같은 이름이면 덮어씁니다.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.options.vars.insert(name.into(), value.into());
        self
    }

    /// 민감한 변수를 바인딩합니다. 값은 로그와 결과에서 가려집니다.
    pub fn sensitive_var(self, name: impl Into<String>, value: impl Into<VarValue>) -> Self {
        let name = name.into();
        self.mark_sensitive(name.clone()).var(name, value)
    }

    /// 변수 여러 개를 바인딩합니다.
    pub fn vars(mut self, vars: BTreeMap<String, VarValue>) -> Self {
        self.options.vars.extend(vars);
        self
    }

    /// 이미 바인딩되었거나 바인딩될 변수를 민감한 것으로 표시합니다.
    pub fn mark_sensitive(mut self, name: impl Into<String>) -> Self {
        self.options.sensitive_vars.insert(name.into());
        self
    }

    /// 변수 파일을 추가합니다.
    pub fn var_file(mut self, path: impl Into<String>) -> Self {
        self.options.var_files.push(path.into());
        self
    }

    /// 외부 프로세스 환경변수를 추가합니다.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// init 시 전달할 백엔드 설정을 추가합니다.
    pub fn backend_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.backend_config.insert(key.into(), value.into());
        self
    }

    /// plan 이후 apply까지 수행할지 설정합니다.
    pub fn apply(mut self, apply: bool) -> Self {
        self.options.apply = apply;
        self
    }

    /// 옵션을 검증하고 생성합니다.
    ///
    /// # Errors
    ///
    /// - `HarnessError::FixtureMissing`: 픽스처 디렉토리가 없음
    /// - `HarnessError::InvalidOptions`: 잘못된 변수 이름, 존재하지 않는 변수 파일
    pub fn build(self) -> Result<TerraformOptions, HarnessError> {
        let options = self.options;

        for name in options.vars.keys() {
            if !is_valid_identifier(name) {
                return Err(HarnessError::InvalidOptions {
                    field: "vars".to_owned(),
                    reason: format!("'{name}' is not a valid variable name"),
                });
            }
        }

        for key in options.env.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(HarnessError::InvalidOptions {
                    field: "env".to_owned(),
                    reason: format!("'{key}' is not a valid environment variable name"),
                });
            }
        }

        options.validate()?;
        Ok(options)
    }
}

/// 픽스처 디렉토리를 재귀적으로 복사합니다. 상태 파일과 플러그인 캐시는 제외합니다.
pub fn copy_fixture_dir(src: &Path, dst: &Path) -> Result<(), HarnessError> {
    if !src.is_dir() {
        return Err(HarnessError::FixtureMissing(src.display().to_string()));
    }
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if SKIPPED_ENTRIES.iter().any(|skip| name == *skip) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        if entry.file_type()?.is_dir() {
            copy_fixture_dir(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("main.tf"), "variable \"server_ip\" {}\n").expect("write");
        dir
    }

    #[test]
    fn build_requires_existing_dir() {
        let err = TerraformOptions::builder("/no/such/fixture")
            .build()
            .unwrap_err();
        assert!(matches!(err, HarnessError::FixtureMissing(_)));
    }

    #[test]
    fn build_rejects_invalid_var_name() {
        let dir = fixture();
        let err = TerraformOptions::builder(dir.path())
            .var("bad name", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidOptions { .. }));
    }

    #[test]
    fn build_rejects_missing_var_file() {
        let dir = fixture();
        let err = TerraformOptions::builder(dir.path())
            .var_file("missing.tfvars")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("missing.tfvars"));
    }

    #[test]
    fn later_var_overrides_earlier() {
        let dir = fixture();
        let options = TerraformOptions::builder(dir.path())
            .var("server_ip", "10.0.0.1")
            .var("server_ip", "10.0.0.9")
            .build()
            .expect("build");
        assert_eq!(options.vars()["server_ip"], VarValue::from("10.0.0.9"));
        assert!(!options.apply());
    }

    #[test]
    fn sensitive_values_are_redacted() {
        let dir = fixture();
        let options = TerraformOptions::builder(dir.path())
            .var("server_ip", "10.0.0.1")
            .sensitive_var("ssh_private_key", "dummy-key-for-testing")
            .build()
            .expect("build");

        assert_eq!(options.secrets(), vec!["dummy-key-for-testing"]);
        let shown = options.redacted_vars();
        assert_eq!(shown["server_ip"], "10.0.0.1");
        assert_eq!(shown["ssh_private_key"], REDACTED);
    }

    #[test]
    fn from_fixture_reads_config() {
        let dir = fixture();
        let toml = format!(
            r#"
[fixtures.basic]
dir = "{}"
apply = true
sensitive_vars = ["ssh_private_key"]
[fixtures.basic.vars]
server_ip = "10.0.0.1"
ssh_private_key = "k"
[fixtures.basic.env]
TF_IN_AUTOMATION = "1"
"#,
            dir.path().display()
        );
        let config = InfraprobeConfig::parse(&toml).expect("parse");
        let options = TerraformOptions::from_fixture(&config, "basic")
            .expect("fixture")
            .var("server_ip", "10.0.0.2")
            .build()
            .expect("build");

        assert!(options.apply());
        assert_eq!(options.vars()["server_ip"], VarValue::from("10.0.0.2"));
        assert_eq!(options.env()["TF_IN_AUTOMATION"], "1");
        assert!(options.sensitive_vars().contains("ssh_private_key"));
    }

    #[test]
    fn from_fixture_unknown_name() {
        let config = InfraprobeConfig::default();
        let err = TerraformOptions::from_fixture(&config, "nope").unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn isolated_copy_skips_state() {
        let src = fixture();
        std::fs::write(src.path().join("terraform.tfstate"), "{}").expect("write");
        std::fs::create_dir(src.path().join(".terraform")).expect("mkdir");
        std::fs::create_dir(src.path().join("modules")).expect("mkdir");
        std::fs::write(src.path().join("modules/net.tf"), "").expect("write");

        let options = TerraformOptions::builder(src.path()).build().expect("build");
        let dest = tempfile::tempdir().expect("tempdir");
        let isolated = options.isolated_in(dest.path()).expect("copy");

        let copied = isolated.fixture_dir();
        assert!(copied.starts_with(dest.path()));
        assert!(copied.join("main.tf").is_file());
        assert!(copied.join("modules/net.tf").is_file());
        assert!(!copied.join("terraform.tfstate").exists());
        assert!(!copied.join(".terraform").exists());
    }
}
