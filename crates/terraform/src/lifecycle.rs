//! 라이프사이클 구동: init → plan → (apply) → destroy
//!
//! [`LifecycleDriver`]는 [`ProcessRunner`]를 통해 단계를 엄격한 순서로 실행합니다.
//! 어느 단계든 0이 아닌 코드로 끝나면 남은 전진 단계를 중단하고
//! 실패한 단계의 실행 결과를 담은 [`LifecycleError`]를 반환합니다.
//!
//! # 정리 보장
//!
//! [`LifecycleDriver::run_scoped`]는 전진 단계와 호출자 본문을 별도 태스크에서 실행하고,
//! 태스크가 어떻게 끝나든(성공, 에러, 패닉, 취소) destroy를 정확히 한 번 실행합니다.
//! 본문의 패닉은 destroy가 끝난 뒤 다시 발생시킵니다.
//!
//! ```text
//!  run_scoped
//!    │
//!    ├─ spawn ─▶ init ─▶ plan ─▶ (apply) ─▶ body(env)
//!    │                                         │
//!    ◀──────────── JoinHandle (Ok / Err / panic / cancel)
//!    │
//!    └─ destroy (취소 불가) ─▶ 결과 병합 ─▶ 패닉이면 resume_unwind
//! ```
//!
//! destroy 실패는 주 실패를 가리지 않고 [`HarnessError::CleanupFailed`]의
//! 보조 정보로 붙습니다.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use infraprobe_core::config::TerraformConfig;
use infraprobe_core::error::{LifecycleError, ProcessError};
use infraprobe_core::metrics as m;
use infraprobe_core::types::{ExecutionResult, LifecycleStep};
use regex::Regex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::command::{TerraformCommand, version_invocation};
use crate::error::HarnessError;
use crate::options::TerraformOptions;
use crate::outputs::Outputs;
use crate::runner::{ProcessRunner, REDACTED};
use crate::version::{check_min_version, parse_version};

/// 단계 하나의 최종 기록
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// 단계
    pub step: LifecycleStep,
    /// 시도 횟수 (재시도 포함)
    pub attempts: u32,
    /// 마지막 시도의 실행 결과
    pub result: ExecutionResult,
}

/// 한 번의 라이프사이클 실행 보고서
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleReport {
    /// 실행 식별자 (로그 상관관계용)
    pub run_id: String,
    /// 픽스처 디렉토리
    pub fixture_dir: PathBuf,
    /// 실행된 단계 (destroy 포함, 실행 순서)
    pub steps: Vec<StepRecord>,
    /// detailed exit code 사용 시 plan의 변경 여부
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_has_changes: Option<bool>,
    /// destroy가 성공했는지 여부
    pub destroyed: bool,
}

impl LifecycleReport {
    /// 특정 단계의 기록을 찾습니다 (여러 번이면 마지막).
    pub fn step(&self, step: LifecycleStep) -> Option<&StepRecord> {
        self.steps.iter().rev().find(|r| r.step == step)
    }

    /// 특정 단계가 실행된 횟수
    pub fn count(&self, step: LifecycleStep) -> usize {
        self.steps.iter().filter(|r| r.step == step).count()
    }
}

/// [`LifecycleDriver::run_scoped`]의 결과
///
/// 본문이 실패해도 보고서는 항상 남습니다.
#[derive(Debug)]
pub struct ScopedRun<T> {
    /// 실행된 단계 보고서
    pub report: LifecycleReport,
    /// 전진 단계, 본문, destroy 결과를 병합한 최종 결과
    pub result: Result<T, HarnessError>,
}

impl<T> ScopedRun<T> {
    /// 보고서를 버리고 결과만 반환합니다.
    pub fn into_result(self) -> Result<T, HarnessError> {
        self.result
    }

    /// 최종 결과가 성공인지 여부
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// 라이프사이클 구동기
///
/// 복제 비용이 작습니다 (내부 상태는 `Arc`로 공유).
pub struct LifecycleDriver<R: ProcessRunner> {
    runner: Arc<R>,
    config: Arc<TerraformConfig>,
    retryable: Arc<Vec<Regex>>,
    cancel: CancellationToken,
}

impl<R: ProcessRunner> Clone for LifecycleDriver<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            config: Arc::clone(&self.config),
            retryable: Arc::clone(&self.retryable),
            cancel: self.cancel.clone(),
        }
    }
}

impl<R: ProcessRunner> LifecycleDriver<R> {
    /// 새 구동기를 생성합니다.
    ///
    /// # Errors
    ///
    /// `retryable_errors`에 잘못된 정규식이 있으면 `HarnessError::InvalidOptions`
    pub fn new(runner: Arc<R>, config: TerraformConfig) -> Result<Self, HarnessError> {
        let retryable = config
            .retryable_errors
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| HarnessError::InvalidOptions {
                    field: "retryable_errors".to_owned(),
                    reason: format!("invalid pattern '{pattern}': {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            runner,
            config: Arc::new(config),
            retryable: Arc::new(retryable),
            cancel: CancellationToken::new(),
        })
    }

    /// 외부 취소 토큰을 연결합니다. 취소되면 전진 단계가 중단됩니다.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 연결된 취소 토큰
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// 실행 설정
    pub fn config(&self) -> &TerraformConfig {
        &self.config
    }

    /// 수동 제어용 환경 핸들을 만듭니다.
    ///
    /// 옵션을 이 시점에 검증하므로, 실패하면 어떤 프로세스도 실행되지 않습니다.
    /// 핸들을 `destroy` 없이 버리면 경고 로그를 남깁니다.
    pub fn environment(&self, options: TerraformOptions) -> Result<Environment<R>, HarnessError> {
        options.validate()?;
        Ok(Environment::new(self, options))
    }

    /// 전진 단계와 `body`를 실행하고, 어떤 경우에도 destroy를 한 번 실행합니다.
    ///
    /// - 옵션 검증 실패: 아무것도 실행하지 않고 에러 반환 (destroy 없음)
    /// - 전진 단계 또는 본문 실패: destroy 후 원래 에러 반환
    /// - destroy도 실패: `CleanupFailed { primary, cleanup }`
    /// - 본문 패닉: destroy 후 패닉 재발생
    /// - 취소: 실행 중인 단계를 종료하고 destroy 후 `ProcessError::Cancelled`
    pub async fn run_scoped<T, F, Fut>(&self, options: TerraformOptions, body: F) -> ScopedRun<T>
    where
        T: Send + 'static,
        F: FnOnce(Environment<R>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, HarnessError>> + Send + 'static,
    {
        let env = match self.environment(options.clone()) {
            Ok(env) => env,
            Err(e) => {
                return ScopedRun {
                    report: LifecycleReport {
                        run_id: Uuid::new_v4().to_string(),
                        fixture_dir: options.fixture_dir().to_path_buf(),
                        steps: Vec::new(),
                        plan_has_changes: None,
                        destroyed: false,
                    },
                    result: Err(e),
                };
            }
        };

        let span = info_span!(
            "lifecycle",
            run_id = %env.run_id(),
            fixture = %env.fixture_dir().display()
        );
        info!(parent: &span, apply = env.options().apply(), "starting scoped run");

        let task_env = env.clone();
        let mut handle = tokio::spawn(
            async move {
                task_env.provision().await?;
                body(task_env).await
            }
            .instrument(span.clone()),
        );

        let joined = tokio::select! {
            joined = &mut handle => joined,
            () = self.cancel.cancelled() => {
                warn!(parent: &span, "run cancelled, aborting forward steps");
                handle.abort();
                handle.await
            }
        };

        let outcome = match joined {
            Ok(result) => Outcome::Finished(result),
            Err(e) if e.is_panic() => Outcome::Panicked(e.into_panic()),
            Err(e) if e.is_cancelled() => Outcome::Finished(Err(HarnessError::Process(
                ProcessError::Cancelled {
                    program: self.config.binary.clone(),
                },
            ))),
            Err(e) => Outcome::Finished(Err(HarnessError::Aborted(e.to_string()))),
        };

        // 본문의 destroy가 끝까지 실행된 경우에만 생략 (중단된 destroy는 다시 실행)
        let cleanup = if env.destroy_finished() {
            None
        } else {
            Some(env.destroy().instrument(span.clone()).await)
        };
        let report = env.report();

        match outcome {
            Outcome::Panicked(payload) => {
                error!(parent: &span, "body panicked, destroy completed, resuming panic");
                std::panic::resume_unwind(payload)
            }
            Outcome::Finished(result) => {
                let result = merge_cleanup(result, cleanup);
                match &result {
                    Ok(_) => info!(parent: &span, destroyed = report.destroyed, "scoped run finished"),
                    Err(e) => error!(parent: &span, error = %e, "scoped run failed"),
                }
                ScopedRun { report, result }
            }
        }
    }

    /// 본문 없이 전진 단계만 실행하고 destroy합니다.
    pub async fn run(&self, options: TerraformOptions) -> ScopedRun<()> {
        self.run_scoped(options, |_env| async { Ok(()) }).await
    }

    /// destroy만 실행합니다 (수동 정리용).
    pub async fn destroy(&self, options: TerraformOptions) -> Result<ExecutionResult, HarnessError> {
        let env = self.environment(options)?;
        env.destroy().await
    }

    /// 외부 바이너리 버전을 확인합니다. `min_version`이 설정되어 있으면 함께 검사합니다.
    pub async fn version(&self, working_dir: &Path) -> Result<semver::Version, HarnessError> {
        let invocation = version_invocation(&self.config, working_dir);
        let result = self.runner.run(&invocation, &self.cancel).await?;
        if !result.success() {
            return Err(HarnessError::Version(format!(
                "`{}` exited with code {}{}",
                result.command_line(),
                result.exit_code,
                result.output_report()
            )));
        }
        let version = parse_version(&result.stdout)?;
        if let Some(ref min) = self.config.min_version {
            check_min_version(&version, min)?;
        }
        info!(version = %version, "external binary version");
        Ok(version)
    }
}

enum Outcome<T> {
    Finished(Result<T, HarnessError>),
    Panicked(Box<dyn std::any::Any + Send + 'static>),
}

fn merge_cleanup<T>(
    result: Result<T, HarnessError>,
    cleanup: Option<Result<ExecutionResult, HarnessError>>,
) -> Result<T, HarnessError> {
    match (result, cleanup) {
        (Ok(value), None | Some(Ok(_))) => Ok(value),
        (Ok(_), Some(Err(cleanup))) => Err(cleanup),
        (Err(primary), None | Some(Ok(_))) => Err(primary),
        (Err(primary), Some(Err(cleanup))) => Err(HarnessError::with_cleanup(primary, cleanup)),
    }
}

#[derive(Debug, Default)]
struct Journal {
    steps: Vec<StepRecord>,
    plan_has_changes: Option<bool>,
    provisioned: bool,
    destroy_attempted: bool,
    destroy_finished: bool,
    destroyed: bool,
    kept: bool,
}

struct EnvironmentInner<R: ProcessRunner> {
    runner: Arc<R>,
    config: Arc<TerraformConfig>,
    retryable: Arc<Vec<Regex>>,
    options: TerraformOptions,
    cancel: CancellationToken,
    run_id: Uuid,
    journal: Mutex<Journal>,
}

impl<R: ProcessRunner> Drop for EnvironmentInner<R> {
    fn drop(&mut self) {
        let journal = self.journal.get_mut().unwrap_or_else(PoisonError::into_inner);
        if journal.provisioned && !journal.destroy_attempted && !journal.kept {
            warn!(
                run_id = %self.run_id,
                fixture = %self.options.fixture_dir().display(),
                "environment dropped without destroy, external resources may be left behind"
            );
        }
    }
}

/// 프로비저닝된 환경에 대한 수동 제어 핸들
///
/// 복제하면 같은 환경을 가리킵니다. 단계 기록은 모든 복제본이 공유합니다.
pub struct Environment<R: ProcessRunner> {
    inner: Arc<EnvironmentInner<R>>,
}

impl<R: ProcessRunner> Clone for Environment<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: ProcessRunner> Environment<R> {
    fn new(driver: &LifecycleDriver<R>, options: TerraformOptions) -> Self {
        Self {
            inner: Arc::new(EnvironmentInner {
                runner: Arc::clone(&driver.runner),
                config: Arc::clone(&driver.config),
                retryable: Arc::clone(&driver.retryable),
                options,
                cancel: driver.cancel.clone(),
                run_id: Uuid::new_v4(),
                journal: Mutex::new(Journal::default()),
            }),
        }
    }

    /// 실행 식별자
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// 실행 옵션
    pub fn options(&self) -> &TerraformOptions {
        &self.inner.options
    }

    /// 픽스처 디렉토리 (모든 단계의 작업 디렉토리)
    pub fn fixture_dir(&self) -> &Path {
        self.inner.options.fixture_dir()
    }

    /// 작업 디렉토리를 초기화합니다.
    pub async fn init(&self) -> Result<ExecutionResult, HarnessError> {
        self.journal().provisioned = true;
        self.run_step(LifecycleStep::Init, &self.inner.cancel).await
    }

    /// 변경 계획을 실행합니다.
    ///
    /// detailed exit code를 사용하면 종료 코드 2(변경 있음)도 성공입니다.
    pub async fn plan(&self) -> Result<ExecutionResult, HarnessError> {
        let result = self.run_step(LifecycleStep::Plan, &self.inner.cancel).await?;
        if self.inner.config.detailed_exitcode {
            self.journal().plan_has_changes = Some(result.exit_code == 2);
        }
        Ok(result)
    }

    /// 변경을 적용합니다.
    pub async fn apply(&self) -> Result<ExecutionResult, HarnessError> {
        self.journal().provisioned = true;
        self.run_step(LifecycleStep::Apply, &self.inner.cancel).await
    }

    /// `output -json`을 실행하고 해석합니다.
    ///
    /// 해석은 원문 stdout으로 하고, 기록에는 민감한 출력 값을 가린 JSON만 남깁니다.
    pub async fn output(&self) -> Result<Outputs, HarnessError> {
        let result = self.run_step(LifecycleStep::Output, &self.inner.cancel).await?;
        let parsed = Outputs::parse(&result.stdout);
        let shown = match &parsed {
            Ok(outputs) => serde_json::to_string(&outputs.redacted())
                .unwrap_or_else(|_| REDACTED.to_owned()),
            Err(_) => REDACTED.to_owned(),
        };
        if let Some(record) = self
            .journal()
            .steps
            .iter_mut()
            .rev()
            .find(|r| r.step == LifecycleStep::Output)
        {
            record.result.stdout = shown;
        }
        parsed
    }

    /// init → plan → (옵션에 따라) apply를 순서대로 실행합니다.
    pub async fn provision(&self) -> Result<(), HarnessError> {
        self.init().await?;
        self.plan().await?;
        if self.inner.options.apply() {
            self.apply().await?;
        }
        Ok(())
    }

    /// 리소스를 제거합니다.
    ///
    /// 취소 토큰을 따르지 않으므로 취소된 실행에서도 끝까지 수행됩니다.
    /// 제한 시간과 재시도 설정은 그대로 적용됩니다.
    pub async fn destroy(&self) -> Result<ExecutionResult, HarnessError> {
        self.journal().destroy_attempted = true;
        let uncancellable = CancellationToken::new();
        let result = self.run_step(LifecycleStep::Destroy, &uncancellable).await;
        self.journal().destroy_finished = true;
        match &result {
            Ok(_) => self.journal().destroyed = true,
            Err(e) => {
                metrics::counter!(m::LIFECYCLE_CLEANUP_FAILURES_TOTAL).increment(1);
                error!(run_id = %self.inner.run_id, error = %e, "destroy failed");
            }
        }
        result
    }

    /// 환경을 의도적으로 남겨 둡니다. 이후 핸들을 버려도 경고하지 않습니다.
    ///
    /// 남겨 둔 리소스는 같은 옵션으로 [`LifecycleDriver::destroy`]를 호출해 정리합니다.
    pub fn leave_in_place(&self) {
        self.journal().kept = true;
        info!(
            run_id = %self.inner.run_id,
            fixture = %self.fixture_dir().display(),
            "environment left in place, destroy skipped"
        );
    }

    /// destroy를 시도했는지 여부 (중단된 시도 포함)
    pub fn destroy_attempted(&self) -> bool {
        self.journal().destroy_attempted
    }

    /// destroy가 성공 또는 실패로 끝났는지 여부
    ///
    /// 실행 도중 중단된 destroy는 끝난 것으로 보지 않습니다.
    pub fn destroy_finished(&self) -> bool {
        self.journal().destroy_finished
    }

    /// detailed exit code 사용 시 plan의 변경 여부
    pub fn plan_has_changes(&self) -> Option<bool> {
        self.journal().plan_has_changes
    }

    /// 지금까지의 단계 보고서
    pub fn report(&self) -> LifecycleReport {
        let journal = self.journal();
        LifecycleReport {
            run_id: self.inner.run_id.to_string(),
            fixture_dir: self.inner.options.fixture_dir().to_path_buf(),
            steps: journal.steps.clone(),
            plan_has_changes: journal.plan_has_changes,
            destroyed: journal.destroyed,
        }
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.inner
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_retryable(&self, result: &ExecutionResult) -> bool {
        let output = result.combined_output();
        self.inner.retryable.iter().any(|re| re.is_match(&output))
    }

    fn accepts(&self, step: LifecycleStep, exit_code: i32) -> bool {
        exit_code == 0
            || (step == LifecycleStep::Plan && self.inner.config.detailed_exitcode && exit_code == 2)
    }

    /// 단계를 실행하고, 재시도 가능한 출력이면 선형 백오프로 재시도합니다.
    async fn run_step(
        &self,
        step: LifecycleStep,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, HarnessError> {
        let config = &self.inner.config;
        let invocation = TerraformCommand::new(config, &self.inner.options).invocation(step);
        let backoff_base = Duration::from_millis(config.retry_backoff_ms);
        let run_id = self.inner.run_id;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if attempt > 1 {
                let backoff = backoff_base * (attempt - 1);
                warn!(
                    %run_id,
                    step = %step,
                    attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying step after retryable error"
                );
                metrics::counter!(m::LIFECYCLE_RETRIES_TOTAL, m::LABEL_STEP => step.as_str())
                    .increment(1);
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    () = cancel.cancelled() => {
                        return Err(ProcessError::Cancelled { program: invocation.program.clone() }.into());
                    }
                }
            }

            let result = match self.inner.runner.run(&invocation, cancel).await {
                Ok(result) => result,
                Err(e) => {
                    record_step(step, m::RESULT_ERROR);
                    error!(%run_id, step = %step, error = %e, "step could not be executed");
                    return Err(e.into());
                }
            };

            if self.accepts(step, result.exit_code) {
                record_step(step, m::RESULT_SUCCESS);
                info!(
                    %run_id,
                    step = %step,
                    exit_code = result.exit_code,
                    duration_ms = result.duration_ms(),
                    attempts = attempt,
                    "step completed"
                );
                self.push_record(step, attempt, result.clone());
                return Ok(result);
            }

            if attempt <= config.max_retries && self.is_retryable(&result) {
                continue;
            }

            record_step(step, m::RESULT_FAILURE);
            error!(
                %run_id,
                step = %step,
                exit_code = result.exit_code,
                duration_ms = result.duration_ms(),
                attempts = attempt,
                "step failed"
            );
            self.push_record(step, attempt, result.clone());
            return Err(LifecycleError {
                step,
                result,
                attempts: attempt,
            }
            .into());
        }
    }

    fn push_record(&self, step: LifecycleStep, attempts: u32, result: ExecutionResult) {
        self.journal().steps.push(StepRecord {
            step,
            attempts,
            result,
        });
    }
}

fn record_step(step: LifecycleStep, result: &'static str) {
    metrics::counter!(
        m::LIFECYCLE_STEPS_TOTAL,
        m::LABEL_STEP => step.as_str(),
        m::LABEL_RESULT => result
    )
    .increment(1);
}
