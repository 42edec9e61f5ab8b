//! 통합 테스트 -- 라이프사이클 정리 보장 검증
//!
//! 스크립트된 실행기로 init → plan → (apply) → destroy 흐름을 구동하고
//! 어떤 종료 경로에서도 destroy가 정확히 한 번 실행되는지 확인합니다.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use infraprobe_core::config::TerraformConfig;
use infraprobe_core::error::ProcessError;
use infraprobe_core::types::LifecycleStep;
use infraprobe_terraform::assert::{Expectation, check};
use infraprobe_terraform::{HarnessError, LifecycleDriver, TerraformOptions};
use tokio_util::sync::CancellationToken;

// 통합 테스트용 스크립트 실행기
mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use infraprobe_core::error::ProcessError;
    use infraprobe_core::types::ExecutionResult;
    use infraprobe_terraform::{Invocation, ProcessRunner};
    use tokio_util::sync::CancellationToken;

    /// 서브커맨드별로 종료 코드, stderr, 실행 시간을 지정하는 실행기
    ///
    /// 실행 시간 동안 취소 토큰이 취소되면 실제 프로세스처럼 중단됩니다.
    #[derive(Default)]
    pub struct ScriptedRunner {
        exits: Mutex<HashMap<String, (i32, String)>>,
        delays: Mutex<HashMap<String, Duration>>,
        missing_binary: Mutex<bool>,
        calls: Mutex<Vec<Invocation>>,
        finished: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail(self, subcommand: &str, exit_code: i32, stderr: &str) -> Self {
            self.exits
                .lock()
                .expect("lock")
                .insert(subcommand.to_owned(), (exit_code, stderr.to_owned()));
            self
        }

        pub fn slow(self, subcommand: &str, delay: Duration) -> Self {
            self.delays
                .lock()
                .expect("lock")
                .insert(subcommand.to_owned(), delay);
            self
        }

        pub fn without_binary(self) -> Self {
            *self.missing_binary.lock().expect("lock") = true;
            self
        }

        pub fn subcommands(&self) -> Vec<String> {
            self.calls
                .lock()
                .expect("lock")
                .iter()
                .map(|inv| inv.args[0].clone())
                .collect()
        }

        pub fn count(&self, subcommand: &str) -> usize {
            self.subcommands().iter().filter(|s| *s == subcommand).count()
        }

        /// 중단되지 않고 끝난 서브커맨드 목록
        pub fn finished(&self) -> Vec<String> {
            self.finished.lock().expect("lock").clone()
        }
    }

    impl ProcessRunner for ScriptedRunner {
        async fn run(
            &self,
            invocation: &Invocation,
            cancel: &CancellationToken,
        ) -> Result<ExecutionResult, ProcessError> {
            self.calls.lock().expect("lock").push(invocation.clone());
            if *self.missing_binary.lock().expect("lock") {
                return Err(ProcessError::BinaryNotFound {
                    program: invocation.program.clone(),
                });
            }
            let subcommand = invocation.args[0].clone();
            let delay = self.delays.lock().expect("lock").get(&subcommand).copied();
            if let Some(delay) = delay {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => {
                        return Err(ProcessError::Cancelled {
                            program: invocation.program.clone(),
                        });
                    }
                }
            }
            self.finished.lock().expect("lock").push(subcommand.clone());
            let (code, stderr) = self
                .exits
                .lock()
                .expect("lock")
                .get(&subcommand)
                .cloned()
                .unwrap_or((0, String::new()));
            Ok(invocation.result(code, "", &stderr, Duration::from_millis(5)))
        }
    }
}

use mock::ScriptedRunner;

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("main.tf"), "variable \"server_ip\" {}\n").expect("write");
    dir
}

fn basic_options(dir: &Path) -> TerraformOptions {
    TerraformOptions::builder(dir)
        .var("server_ip", "10.0.0.1")
        .sensitive_var("ssh_private_key", "dummy-key-for-testing")
        .build()
        .expect("options")
}

fn driver(runner: ScriptedRunner) -> (Arc<ScriptedRunner>, LifecycleDriver<ScriptedRunner>) {
    let runner = Arc::new(runner);
    let driver =
        LifecycleDriver::new(Arc::clone(&runner), TerraformConfig::default()).expect("driver");
    (runner, driver)
}

#[tokio::test]
async fn reference_scenario_init_plan_destroy() {
    let dir = fixture();
    let (runner, driver) = driver(ScriptedRunner::new());

    let run = driver.run(basic_options(dir.path())).await;

    run.result.as_ref().expect("run should succeed");
    assert_eq!(runner.subcommands(), vec!["init", "plan", "destroy"]);
    for step in [LifecycleStep::Init, LifecycleStep::Plan, LifecycleStep::Destroy] {
        let record = run.report.step(step).expect("step recorded");
        check(&record.result, &Expectation::Success).expect("exit code 0");
        assert_eq!(record.result.working_dir, dir.path());
    }
}

#[tokio::test]
async fn destroy_runs_exactly_once_for_every_failure_point() {
    for failing in ["init", "plan", "apply"] {
        let dir = fixture();
        let (runner, driver) = driver(ScriptedRunner::new().fail(failing, 1, "boom"));
        let options = TerraformOptions::builder(dir.path())
            .apply(true)
            .build()
            .expect("options");

        let run = driver.run(options).await;

        assert!(run.result.is_err(), "{failing} failure must fail the run");
        assert_eq!(runner.count("destroy"), 1, "destroy once when {failing} fails");
        assert_eq!(
            runner.subcommands().last().map(String::as_str),
            Some("destroy"),
            "destroy must be last when {failing} fails"
        );
    }
}

#[tokio::test]
async fn missing_variable_fails_plan_with_diagnostic() {
    let dir = fixture();
    let (_runner, driver) = driver(ScriptedRunner::new().fail(
        "plan",
        1,
        "Error: No value for required variable\n\nThe root module input variable \"server_ip\" is not set",
    ));
    let options = TerraformOptions::builder(dir.path())
        .build()
        .expect("options");

    let err = driver.run(options).await.into_result().unwrap_err();

    match err {
        HarnessError::Lifecycle(e) => {
            assert_eq!(e.step, LifecycleStep::Plan);
            assert_ne!(e.result.exit_code, 0);
            assert!(e.to_string().contains("server_ip"), "message: {e}");
        }
        other => panic!("expected plan failure, got {other:?}"),
    }
}

#[tokio::test]
async fn cleanup_failure_is_secondary() {
    let dir = fixture();
    let (runner, driver) = driver(
        ScriptedRunner::new()
            .fail("plan", 1, "plan exploded")
            .fail("destroy", 1, "destroy exploded"),
    );

    let err = driver
        .run(basic_options(dir.path()))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(runner.count("destroy"), 1);
    let msg = err.to_string();
    let primary_at = msg.find("plan exploded").expect("primary output reported");
    let cleanup_at = msg.find("destroy exploded").expect("cleanup output reported");
    assert!(
        primary_at < cleanup_at,
        "primary failure must be reported first: {msg}"
    );
    assert!(matches!(err.primary(), HarnessError::Lifecycle(e) if e.step == LifecycleStep::Plan));
}

#[tokio::test]
async fn assertion_failure_in_body_still_destroys() {
    let dir = fixture();
    let (runner, driver) = driver(ScriptedRunner::new());

    let run = driver
        .run_scoped(basic_options(dir.path()), |env| async move {
            let report = env.report();
            let plan = report.step(LifecycleStep::Plan).expect("plan ran");
            check(&plan.result, &Expectation::StdoutContains("no such text".into()))?;
            Ok(())
        })
        .await;

    assert!(matches!(run.result, Err(HarnessError::Assertion(_))));
    assert_eq!(runner.count("destroy"), 1);
}

#[tokio::test]
async fn panic_in_body_still_destroys() {
    let dir = fixture();
    let (runner, driver) = driver(ScriptedRunner::new());
    let options = basic_options(dir.path());

    let outcome = tokio::spawn(async move {
        driver
            .run_scoped(options, |_env| async move {
                assert_eq!(1 + 1, 3, "deliberate failure");
                Ok(())
            })
            .await
    })
    .await;

    assert!(outcome.expect_err("panic must propagate").is_panic());
    assert_eq!(runner.count("destroy"), 1);
}

#[tokio::test]
async fn missing_binary_is_process_error() {
    let dir = fixture();
    let (runner, driver) = driver(ScriptedRunner::new().without_binary());

    let err = driver
        .run(basic_options(dir.path()))
        .await
        .into_result()
        .unwrap_err();

    assert!(matches!(
        err.primary(),
        HarnessError::Process(ProcessError::BinaryNotFound { .. })
    ));
    assert_eq!(runner.count("destroy"), 1, "cleanup is still attempted");
}

#[tokio::test]
async fn standalone_destroy_runs_only_destroy() {
    let dir = fixture();
    let (runner, driver) = driver(ScriptedRunner::new());

    let result = driver
        .destroy(basic_options(dir.path()))
        .await
        .expect("destroy");

    assert!(result.success());
    assert_eq!(runner.subcommands(), vec!["destroy"]);
}

fn cancel_after(token: CancellationToken, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        token.cancel();
    });
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_plan_stops_plan_and_destroys() {
    let dir = fixture();
    let (runner, driver) = driver(ScriptedRunner::new().slow("plan", Duration::from_secs(600)));
    let token = CancellationToken::new();
    let driver = driver.with_cancellation(token.clone());
    cancel_after(token, Duration::from_millis(100));

    let run = driver.run(basic_options(dir.path())).await;

    let err = run.result.as_ref().expect_err("cancelled run must fail");
    assert!(err.is_cancelled(), "got {err:?}");
    assert_eq!(runner.subcommands(), vec!["init", "plan", "destroy"]);
    assert_eq!(runner.finished(), vec!["init", "destroy"]);
    assert!(run.report.destroyed);
    assert_eq!(run.report.count(LifecycleStep::Destroy), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_destroy_lets_destroy_finish() {
    let dir = fixture();
    let (runner, driver) =
        driver(ScriptedRunner::new().slow("destroy", Duration::from_millis(500)));
    let token = CancellationToken::new();
    let driver = driver.with_cancellation(token.clone());
    cancel_after(token, Duration::from_millis(100));

    let run = driver.run(basic_options(dir.path())).await;

    run.result.as_ref().expect("destroy must not be interrupted");
    assert_eq!(runner.finished(), vec!["init", "plan", "destroy"]);
    assert!(run.report.destroyed);
    assert_eq!(run.report.count(LifecycleStep::Destroy), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_body_destroy_runs_destroy_again() {
    let dir = fixture();
    let (runner, driver) =
        driver(ScriptedRunner::new().slow("destroy", Duration::from_millis(500)));
    let token = CancellationToken::new();
    let driver = driver.with_cancellation(token.clone());
    cancel_after(token, Duration::from_millis(100));

    let run = driver
        .run_scoped(basic_options(dir.path()), |env| async move {
            env.destroy().await?;
            Ok(())
        })
        .await;

    let err = run.result.as_ref().expect_err("cancelled run must fail");
    assert!(err.is_cancelled(), "got {err:?}");
    assert_eq!(runner.count("destroy"), 2);
    assert_eq!(runner.finished(), vec!["init", "plan", "destroy"]);
    assert!(run.report.destroyed);
}
