#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{AssertionError, ConfigError, InfraprobeError, LifecycleError, ProcessError};

// 설정
pub use config::{FixtureConfig, GeneralConfig, InfraprobeConfig, TerraformConfig};

// 도메인 타입
pub use types::{ExecutionResult, LifecycleStep, VarValue};
