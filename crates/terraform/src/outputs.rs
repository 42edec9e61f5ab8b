//! `output -json` 결과 해석

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::runner::REDACTED;

/// 출력 값 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    /// 민감한 값인지 여부
    #[serde(default)]
    pub sensitive: bool,
    /// 타입 표현 (`"string"`, `["list", "string"]` 등)
    #[serde(rename = "type", default)]
    pub value_type: serde_json::Value,
    /// 값
    pub value: serde_json::Value,
}

/// 이름별 출력 값
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outputs(BTreeMap<String, OutputValue>);

impl Outputs {
    /// `output -json`의 stdout을 해석합니다. 출력이 하나도 없으면 빈 맵입니다.
    pub fn parse(stdout: &str) -> Result<Self, HarnessError> {
        if stdout.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(stdout).map_err(|e| HarnessError::OutputParse(e.to_string()))
    }

    /// 이름으로 값을 찾습니다.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name).map(|o| &o.value)
    }

    /// 문자열 출력을 가져옵니다.
    pub fn string(&self, name: &str) -> Result<String, HarnessError> {
        match self.get(name) {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(HarnessError::OutputParse(format!(
                "output '{name}' is not a string: {other}"
            ))),
            None => Err(HarnessError::OutputParse(format!(
                "output '{name}' not found"
            ))),
        }
    }

    /// 출력 이름 목록
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 민감한 값을 가린 표시용 맵
    pub fn redacted(&self) -> BTreeMap<String, serde_json::Value> {
        self.0
            .iter()
            .map(|(name, output)| {
                let value = if output.sensitive {
                    serde_json::Value::String(REDACTED.to_owned())
                } else {
                    output.value.clone()
                };
                (name.clone(), value)
            })
            .collect()
    }
}
