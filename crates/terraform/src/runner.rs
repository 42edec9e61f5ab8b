//! 외부 프로세스 실행 추상화
//!
//! [`ProcessRunner`] trait은 외부 바이너리 실행을 추상화하여, 프로덕션에서는
//! [`SystemProcessRunner`]를, 테스트에서는 스크립트된 구현을 사용할 수 있게 합니다.
//!
//! ```text
//! ┌─────────────────┐
//! │ LifecycleDriver │
//! └────────┬────────┘
//!          │ Invocation
//!          ▼
//!   ┌───────────────┐
//!   │ ProcessRunner │ (trait)
//!   └───────────────┘
//!        │       │
//!        ▼       ▼
//!   ┌────────┐ ┌──────┐
//!   │ System │ │ Mock │
//!   └───┬────┘ └──────┘
//!       │
//!       ▼
//!   terraform / tofu
//! ```
//!
//! 실행기는 재시도하지 않습니다. 한 번 실행하고 결과를 그대로 돌려줍니다.
//! 0이 아닌 종료 코드는 에러가 아니며, 판단은 호출자가 합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use infraprobe_core::error::ProcessError;
use infraprobe_core::metrics as m;
use infraprobe_core::types::ExecutionResult;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 로그와 결과에 민감한 값 대신 표시할 문자열
pub const REDACTED: &str = "<redacted>";

/// 출력 스트림에서 가릴 값의 최소 길이
///
/// 이보다 짧은 값은 일반 출력과 우연히 겹치기 쉬워 출력에서 치환하지 않습니다.
/// 인자 목록은 변수 이름 기준으로 가리므로 길이와 무관합니다.
pub const MIN_SECRET_LEN: usize = 8;

/// 외부 프로세스 한 번의 실행 요청
#[derive(Debug, Clone)]
pub struct Invocation {
    /// 실행 파일 이름 또는 경로
    pub program: String,
    /// 인자 목록
    pub args: Vec<String>,
    /// 작업 디렉토리
    pub working_dir: PathBuf,
    /// 추가 환경변수 (상속된 환경 위에 덮어씀)
    pub env: BTreeMap<String, String>,
    /// 제한 시간 (`None`이면 무제한)
    pub timeout: Option<Duration>,
    /// 값을 가릴 `-var` 변수 이름
    sensitive_vars: BTreeSet<String>,
    /// 출력 스트림에서 가릴 값
    secrets: Vec<String>,
    /// stdout을 원문 그대로 결과에 남길지 여부
    raw_stdout: bool,
}

impl Invocation {
    /// 새 실행 요청을 생성합니다.
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            timeout: None,
            sensitive_vars: BTreeSet::new(),
            secrets: Vec::new(),
            raw_stdout: false,
        }
    }

    /// 인자를 하나 추가합니다.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// 인자를 여러 개 추가합니다.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// 환경변수를 하나 추가합니다.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// 환경변수를 여러 개 추가합니다.
    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// 제한 시간을 설정합니다.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// 표시용 인자에서 값을 가릴 변수 이름을 등록합니다.
    ///
    /// `-var name=value`와 `-var=name=value` 형식의 값만 가립니다.
    pub fn sensitive_var(mut self, name: impl Into<String>) -> Self {
        self.sensitive_vars.insert(name.into());
        self
    }

    /// 출력 스트림에서 가릴 값을 등록합니다.
    ///
    /// [`MIN_SECRET_LEN`]보다 짧은 값은 무시합니다.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if value.chars().count() >= MIN_SECRET_LEN {
            self.secrets.push(value);
        }
        self
    }

    /// stdout을 가리지 않고 원문 그대로 결과에 남깁니다.
    ///
    /// 호출자가 stdout을 해석한 뒤 직접 가려야 합니다 (`output -json` 등).
    pub fn raw_stdout(mut self) -> Self {
        self.raw_stdout = true;
        self
    }

    /// 민감한 변수 값이 가려진 인자 목록을 반환합니다.
    pub fn display_args(&self) -> Vec<String> {
        let mut shown = Vec::with_capacity(self.args.len());
        let mut after_var_flag = false;
        for arg in &self.args {
            let display = if after_var_flag {
                self.mask_binding(arg)
            } else if let Some(binding) = arg.strip_prefix("-var=") {
                format!("-var={}", self.mask_binding(binding))
            } else {
                arg.clone()
            };
            after_var_flag = arg == "-var";
            shown.push(display);
        }
        shown
    }

    fn mask_binding(&self, binding: &str) -> String {
        match binding.split_once('=') {
            Some((name, _)) if self.sensitive_vars.contains(name) => format!("{name}={REDACTED}"),
            _ => binding.to_owned(),
        }
    }

    /// 민감한 값이 가려진 명령줄 문자열을 반환합니다.
    pub fn command_line(&self) -> String {
        let args = self.display_args();
        if args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, args.join(" "))
        }
    }

    /// 출력 문자열에서 등록된 민감한 값을 가립니다.
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_owned(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }

    /// 실행 출력으로 결과를 만듭니다. 인자와 출력의 민감한 값은 가립니다.
    ///
    /// [`Invocation::raw_stdout`]이 설정되면 stdout은 원문 그대로입니다.
    pub fn result(
        &self,
        exit_code: i32,
        stdout: &str,
        stderr: &str,
        duration: Duration,
    ) -> ExecutionResult {
        ExecutionResult {
            program: self.program.clone(),
            args: self.display_args(),
            working_dir: self.working_dir.clone(),
            exit_code,
            stdout: if self.raw_stdout {
                stdout.to_owned()
            } else {
                self.redact(stdout)
            },
            stderr: self.redact(stderr),
            duration,
        }
    }
}

/// 외부 프로세스 실행 trait
///
/// `Send + Sync + 'static`이므로 `Arc`로 감싸 여러 태스크에서 공유할 수 있습니다.
///
/// # 구현체
///
/// - [`SystemProcessRunner`]: `tokio::process` 기반 프로덕션 구현
/// - `MockProcessRunner`: 미리 정한 결과를 순서대로 돌려주는 테스트 구현 (테스트 전용)
///
/// # 에러
///
/// - `ProcessError::WorkingDirMissing`: 작업 디렉토리 없음
/// - `ProcessError::BinaryNotFound`: 실행 파일 없음
/// - `ProcessError::Timeout`: 제한 시간 초과 (자식 프로세스는 종료됨)
/// - `ProcessError::Cancelled`: 취소 요청 (자식 프로세스는 종료됨)
pub trait ProcessRunner: Send + Sync + 'static {
    /// 실행 요청을 한 번 수행하고 결과를 반환합니다.
    fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ExecutionResult, ProcessError>> + Send;
}

/// `tokio::process` 기반 프로세스 실행기
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    /// 새 실행기를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ProcessError> {
        let program = invocation.program.as_str();

        if !invocation.working_dir.is_dir() {
            return Err(ProcessError::WorkingDirMissing {
                path: invocation.working_dir.display().to_string(),
            });
        }

        debug!(
            program,
            args = %invocation.display_args().join(" "),
            working_dir = %invocation.working_dir.display(),
            "launching process"
        );

        let mut cmd = Command::new(program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| {
            record_invocation(program, m::RESULT_ERROR);
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::BinaryNotFound {
                    program: program.to_owned(),
                }
            } else {
                ProcessError::LaunchFailed {
                    program: program.to_owned(),
                    reason: e.to_string(),
                }
            }
        })?;

        // 자식은 kill_on_drop이므로 select!에서 출력 future가 버려지면 함께 종료됨
        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| ProcessError::Output {
                program: program.to_owned(),
                reason: e.to_string(),
            })?,
            () = cancel.cancelled() => {
                warn!(program, "process cancelled, killing child");
                record_invocation(program, m::RESULT_ERROR);
                return Err(ProcessError::Cancelled { program: program.to_owned() });
            }
            () = deadline(invocation.timeout) => {
                let timeout = invocation.timeout.unwrap_or_default();
                warn!(program, timeout_secs = timeout.as_secs(), "process timed out, killing child");
                record_invocation(program, m::RESULT_ERROR);
                metrics::counter!(m::PROCESS_TIMEOUTS_TOTAL).increment(1);
                return Err(ProcessError::Timeout { program: program.to_owned(), timeout });
            }
        };

        let duration = started.elapsed();
        // 시그널로 종료되면 코드가 없음
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let result = invocation.result(exit_code, &stdout, &stderr, duration);

        metrics::histogram!(m::PROCESS_DURATION_SECONDS).record(duration.as_secs_f64());
        record_invocation(
            program,
            if result.success() {
                m::RESULT_SUCCESS
            } else {
                m::RESULT_FAILURE
            },
        );

        info!(
            program,
            exit_code,
            duration_ms = result.duration_ms(),
            "process exited"
        );

        Ok(result)
    }
}

fn record_invocation(program: &str, result: &'static str) {
    metrics::counter!(
        m::PROCESS_INVOCATIONS_TOTAL,
        m::LABEL_PROGRAM => program.to_owned(),
        m::LABEL_RESULT => result
    )
    .increment(1);
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

/// 테스트용 프로세스 실행기
///
/// 미리 등록한 응답을 순서대로 반환하고, 받은 요청을 기록합니다.
/// 응답이 소진되면 종료 코드 0과 빈 출력을 반환합니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockProcessRunner {
    responses: std::sync::Mutex<std::collections::VecDeque<MockResponse>>,
    calls: std::sync::Mutex<Vec<Invocation>>,
    completed: std::sync::Mutex<Vec<String>>,
}

/// 테스트용 응답
#[cfg(test)]
pub enum MockResponse {
    /// 주어진 종료 코드와 출력으로 종료
    Exit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// 실행 자체가 실패
    Error(ProcessError),
    /// `delay` 동안 실행된 뒤 종료. 그 사이 취소되면 `ProcessError::Cancelled`
    Slow { delay: Duration, exit_code: i32 },
}

#[cfg(test)]
impl MockResponse {
    pub fn ok(stdout: &str) -> Self {
        Self::Exit {
            exit_code: 0,
            stdout: stdout.to_owned(),
            stderr: String::new(),
        }
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self::Exit {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_owned(),
        }
    }
}

#[cfg(test)]
impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: impl IntoIterator<Item = MockResponse>) -> Self {
        let runner = Self::new();
        runner
            .responses
            .lock()
            .expect("lock")
            .extend(responses);
        runner
    }

    /// 지금까지 받은 요청의 서브커맨드(첫 번째 인자) 목록
    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .map(|inv| inv.args.first().cloned().unwrap_or_default())
            .collect()
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().expect("lock").clone()
    }

    /// 중단되지 않고 끝까지 실행된 요청의 서브커맨드 목록
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().expect("lock").clone()
    }

    fn complete(&self, invocation: &Invocation) {
        let subcommand = invocation.args.first().cloned().unwrap_or_default();
        self.completed.lock().expect("lock").push(subcommand);
    }
}

#[cfg(test)]
impl ProcessRunner for MockProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ProcessError> {
        self.calls.lock().expect("lock").push(invocation.clone());
        let response = self.responses.lock().expect("lock").pop_front();
        match response {
            None => {
                self.complete(invocation);
                Ok(invocation.result(0, "", "", Duration::ZERO))
            }
            Some(MockResponse::Exit {
                exit_code,
                stdout,
                stderr,
            }) => {
                self.complete(invocation);
                Ok(invocation.result(exit_code, &stdout, &stderr, Duration::ZERO))
            }
            Some(MockResponse::Error(e)) => Err(e),
            Some(MockResponse::Slow { delay, exit_code }) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {
                        self.complete(invocation);
                        Ok(invocation.result(exit_code, "", "", delay))
                    }
                    () = cancel.cancelled() => Err(ProcessError::Cancelled {
                        program: invocation.program.clone(),
                    }),
                }
            }
        }
    }
}
