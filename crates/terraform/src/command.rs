//! 단계별 명령줄 구성
//!
//! 각 라이프사이클 단계를 외부 바이너리의 인자 목록으로 변환합니다.
//! 모든 실행의 작업 디렉토리는 픽스처 디렉토리입니다.
//!
//! | 단계 | 인자 |
//! |------|------|
//! | init | `init -upgrade=false -input=false [-backend-config=k=v]... [-no-color]` |
//! | plan | `plan -input=false -lock=false [-var k=v]... [-var-file=f]... [-detailed-exitcode] [-no-color] [-parallelism=n]` |
//! | apply | `apply -input=false -auto-approve -lock=false [vars...] [-no-color] [-parallelism=n]` |
//! | destroy | `destroy -auto-approve -input=false -lock=false [vars...] [-no-color] [-parallelism=n]` |
//! | output | `output -json [-no-color]` |

use std::path::Path;

use infraprobe_core::config::TerraformConfig;
use infraprobe_core::types::LifecycleStep;

use crate::options::TerraformOptions;
use crate::runner::Invocation;
use crate::vars::var_args;

/// 옵션과 실행 설정으로 단계별 [`Invocation`]을 만듭니다.
#[derive(Debug, Clone, Copy)]
pub struct TerraformCommand<'a> {
    config: &'a TerraformConfig,
    options: &'a TerraformOptions,
}

impl<'a> TerraformCommand<'a> {
    pub fn new(config: &'a TerraformConfig, options: &'a TerraformOptions) -> Self {
        Self { config, options }
    }

    /// 단계에 해당하는 실행 요청을 만듭니다.
    pub fn invocation(&self, step: LifecycleStep) -> Invocation {
        let args = match step {
            LifecycleStep::Init => self.init_args(),
            LifecycleStep::Plan => self.plan_args(),
            LifecycleStep::Apply => self.apply_args(),
            LifecycleStep::Destroy => self.destroy_args(),
            LifecycleStep::Output => self.output_args(),
        };

        let mut invocation = Invocation::new(&self.config.binary, self.options.fixture_dir())
            .args(args)
            .envs(self.options.env())
            .timeout(self.config.step_timeout());
        for name in self.options.sensitive_vars() {
            invocation = invocation.sensitive_var(name.clone());
        }
        for secret in self.options.secrets() {
            invocation = invocation.secret(secret);
        }
        // output -json의 stdout은 해석 후 값 단위로 가림
        if step == LifecycleStep::Output {
            invocation = invocation.raw_stdout();
        }
        invocation
    }

    fn init_args(&self) -> Vec<String> {
        let mut args = vec![
            "init".to_owned(),
            format!("-upgrade={}", self.config.upgrade),
            "-input=false".to_owned(),
        ];
        for (key, value) in self.options.backend_config() {
            args.push(format!("-backend-config={key}={value}"));
        }
        self.push_no_color(&mut args);
        args
    }

    fn plan_args(&self) -> Vec<String> {
        let mut args = vec![
            "plan".to_owned(),
            "-input=false".to_owned(),
            format!("-lock={}", self.config.lock),
        ];
        self.push_vars(&mut args);
        if self.config.detailed_exitcode {
            args.push("-detailed-exitcode".to_owned());
        }
        self.push_no_color(&mut args);
        self.push_parallelism(&mut args);
        args
    }

    fn apply_args(&self) -> Vec<String> {
        let mut args = vec![
            "apply".to_owned(),
            "-input=false".to_owned(),
            "-auto-approve".to_owned(),
            format!("-lock={}", self.config.lock),
        ];
        self.push_vars(&mut args);
        self.push_no_color(&mut args);
        self.push_parallelism(&mut args);
        args
    }

    fn destroy_args(&self) -> Vec<String> {
        let mut args = vec![
            "destroy".to_owned(),
            "-auto-approve".to_owned(),
            "-input=false".to_owned(),
            format!("-lock={}", self.config.lock),
        ];
        self.push_vars(&mut args);
        self.push_no_color(&mut args);
        self.push_parallelism(&mut args);
        args
    }

    fn output_args(&self) -> Vec<String> {
        let mut args = vec!["output".to_owned(), "-json".to_owned()];
        self.push_no_color(&mut args);
        args
    }

    fn push_vars(&self, args: &mut Vec<String>) {
        args.extend(var_args(self.options.vars()));
        for file in self.options.var_files() {
            args.push(format!("-var-file={file}"));
        }
    }

    fn push_no_color(&self, args: &mut Vec<String>) {
        if self.config.no_color {
            args.push("-no-color".to_owned());
        }
    }

    fn push_parallelism(&self, args: &mut Vec<String>) {
        if let Some(n) = self.config.parallelism {
            args.push(format!("-parallelism={n}"));
        }
    }
}

/// `version -json` 실행 요청을 만듭니다.
pub fn version_invocation(config: &TerraformConfig, working_dir: &Path) -> Invocation {
    Invocation::new(&config.binary, working_dir)
        .args(["version", "-json"])
        .timeout(config.step_timeout())
}
