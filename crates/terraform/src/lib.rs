//! # infraprobe-terraform
//!
//! 외부 IaC 바이너리(Terraform, OpenTofu 등)를 픽스처 디렉토리에 대해 구동하고
//! 결과를 검증하는 하네스입니다.
//!
//! # 구성
//!
//! - [`runner`]: 외부 프로세스 실행 (`ProcessRunner` trait, `SystemProcessRunner`)
//! - [`command`]: 단계별 명령줄 구성
//! - [`vars`]: 변수 값의 명령줄 렌더링
//! - [`options`]: 실행 옵션 (`TerraformOptions`)
//! - [`lifecycle`]: init → plan → (apply) → destroy 구동과 정리 보장
//! - [`assert`]: 실행 결과 검증
//! - [`outputs`], [`version`]: `output -json`, `version -json` 해석
//!
//! # 사용 예시
//!
//! ```no_run
//! use std::sync::Arc;
//! use infraprobe_core::config::TerraformConfig;
//! use infraprobe_terraform::{LifecycleDriver, SystemProcessRunner, TerraformOptions};
//! use infraprobe_terraform::assert::{Expectation, check};
//!
//! # async fn example() -> Result<(), infraprobe_terraform::HarnessError> {
//! let driver = LifecycleDriver::new(Arc::new(SystemProcessRunner::new()), TerraformConfig::default())?;
//! let options = TerraformOptions::builder("fixtures/basic")
//!     .var("server_ip", "10.0.0.1")
//!     .sensitive_var("ssh_private_key", "dummy-key-for-testing")
//!     .build()?;
//!
//! // destroy는 본문이 어떻게 끝나든 실행됨
//! driver
//!     .run_scoped(options, |env| async move {
//!         let report = env.report();
//!         for record in &report.steps {
//!             check(&record.result, &Expectation::Success)?;
//!         }
//!         Ok(())
//!     })
//!     .await
//!     .into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod assert;
pub mod command;
pub mod error;
pub mod lifecycle;
pub mod options;
pub mod outputs;
pub mod runner;
pub mod vars;
pub mod version;

pub use error::HarnessError;
pub use lifecycle::{Environment, LifecycleDriver, LifecycleReport, ScopedRun, StepRecord};
pub use options::{TerraformOptions, TerraformOptionsBuilder};
pub use outputs::Outputs;
pub use runner::{Invocation, ProcessRunner, SystemProcessRunner};
