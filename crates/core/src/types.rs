//! 도메인 타입: 실행 결과, 라이프사이클 단계, 변수 값
//!
//! 모든 크레이트가 공유하는 데이터 구조를 정의합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 외부 프로세스 한 번의 실행 결과
///
/// Process Runner가 생성하고 Assertion Layer가 즉시 소비합니다.
/// 영속화되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// 실행한 프로그램
    pub program: String,
    /// 인자 목록 (민감한 값은 마스킹된 상태)
    pub args: Vec<String>,
    /// 작업 디렉토리
    pub working_dir: PathBuf,
    /// 종료 코드 (시그널로 종료된 경우 -1)
    pub exit_code: i32,
    /// 표준 출력
    pub stdout: String,
    /// 표준 에러
    pub stderr: String,
    /// 실행 소요 시간
    pub duration: Duration,
}

impl ExecutionResult {
    /// 종료 코드가 0인지 확인합니다.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// 사람이 읽을 수 있는 명령줄 문자열을 반환합니다.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// stdout과 stderr를 이어 붙인 문자열을 반환합니다.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// 에러 메시지에 붙일 진단용 출력 블록을 만듭니다.
    ///
    /// 비어 있지 않은 스트림만 원문 그대로 포함합니다.
    pub fn output_report(&self) -> String {
        let mut report = String::new();
        if !self.stdout.trim().is_empty() {
            report.push_str("\n--- stdout ---\n");
            report.push_str(self.stdout.trim_end());
        }
        if !self.stderr.trim().is_empty() {
            report.push_str("\n--- stderr ---\n");
            report.push_str(self.stderr.trim_end());
        }
        report
    }

    /// 소요 시간을 밀리초로 반환합니다 (로그/리포트용).
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

/// 라이프사이클 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStep {
    /// 작업 디렉토리 초기화
    Init,
    /// 변경 계획
    Plan,
    /// 변경 적용
    Apply,
    /// 출력 값 조회
    Output,
    /// 리소스 제거
    Destroy,
}

impl LifecycleStep {
    /// 외부 바이너리의 서브커맨드 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Output => "output",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 픽스처에 바인딩되는 변수 값
///
/// TOML/JSON의 스칼라, 배열, 테이블을 그대로 표현합니다.
/// 문자열은 명령줄에 그대로 전달되고, 나머지는 HCL 리터럴로 렌더링됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    /// 불리언
    Bool(bool),
    /// 정수
    Integer(i64),
    /// 실수
    Float(f64),
    /// 문자열
    String(String),
    /// 리스트
    List(Vec<VarValue>),
    /// 맵
    Map(BTreeMap<String, VarValue>),
}

impl VarValue {
    /// 문자열 값이면 참조를 반환합니다.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for VarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<VarValue>> From<Vec<T>> for VarValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}
