//! 외부 바이너리 버전 확인
//!
//! `version -json`의 `terraform_version` 필드를 우선 사용하고,
//! JSON을 지원하지 않는 오래된 바이너리는 `Terraform v1.5.7` 형식의 첫 줄에서 읽습니다.

use serde::Deserialize;

use crate::error::HarnessError;

#[derive(Deserialize)]
struct VersionJson {
    terraform_version: String,
}

/// 버전 출력에서 semver 버전을 추출합니다.
pub fn parse_version(stdout: &str) -> Result<semver::Version, HarnessError> {
    let raw = match serde_json::from_str::<VersionJson>(stdout) {
        Ok(parsed) => parsed.terraform_version,
        Err(_) => text_version(stdout)?,
    };
    semver::Version::parse(raw.trim_start_matches('v'))
        .map_err(|e| HarnessError::Version(format!("'{raw}' is not a valid version: {e}")))
}

fn text_version(stdout: &str) -> Result<String, HarnessError> {
    let first_line = stdout.lines().next().unwrap_or_default();
    first_line
        .split_whitespace()
        .find(|word| word.starts_with('v') && word[1..].starts_with(|c: char| c.is_ascii_digit()))
        .map(|word| word.trim_start_matches('v').to_owned())
        .ok_or_else(|| HarnessError::Version(format!("unrecognised version output: '{first_line}'")))
}

/// 최소 버전 요구를 확인합니다.
pub fn check_min_version(actual: &semver::Version, min: &str) -> Result<(), HarnessError> {
    let min = semver::Version::parse(min)
        .map_err(|e| HarnessError::Version(format!("'{min}' is not a valid version: {e}")))?;
    if actual < &min {
        return Err(HarnessError::Version(format!(
            "{actual} is older than the required {min}"
        )));
    }
    Ok(())
}
