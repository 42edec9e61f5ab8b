//! 변수 값 렌더링
//!
//! 변수 바인딩을 `-var name=value` 인자로 변환합니다.
//! 최상위 문자열은 그대로 전달하고, 그 외 값은 HCL 리터럴로 렌더링합니다.
//!
//! | 값 | 렌더링 |
//! |----|--------|
//! | `"10.0.0.1"` | `10.0.0.1` |
//! | `true` | `true` |
//! | `["a", "b"]` | `["a", "b"]` |
//! | `{ env = "test" }` | `{"env" = "test"}` |

use std::collections::BTreeMap;

use infraprobe_core::types::VarValue;

/// 최상위 변수 값을 명령줄 값으로 렌더링합니다.
pub fn format_value(value: &VarValue) -> String {
    match value {
        VarValue::String(s) => s.clone(),
        other => format_hcl(other),
    }
}

/// 값을 HCL 리터럴로 렌더링합니다. 문자열은 따옴표로 감쌉니다.
pub fn format_hcl(value: &VarValue) -> String {
    match value {
        VarValue::Bool(b) => b.to_string(),
        VarValue::Integer(i) => i.to_string(),
        VarValue::Float(f) => f.to_string(),
        VarValue::String(s) => quote(s),
        VarValue::List(items) => {
            let rendered: Vec<String> = items.iter().map(format_hcl).collect();
            format!("[{}]", rendered.join(", "))
        }
        VarValue::Map(entries) => {
            let rendered: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{} = {}", quote(k), format_hcl(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
    }
}

/// HCL 문자열 리터럴 이스케이프
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    escape_templates(&out)
}

/// `${`와 `%{`를 `$${`, `%%{`로 바꿔 리터럴로 취급되게 합니다.
fn escape_templates(s: &str) -> String {
    s.replace("${", "$${").replace("%{", "%%{")
}

/// 변수 바인딩을 `-var` 인자 목록으로 변환합니다. 이름 순서로 정렬됩니다.
pub fn var_args(vars: &BTreeMap<String, VarValue>) -> Vec<String> {
    vars.iter()
        .flat_map(|(name, value)| ["-var".to_owned(), format!("{name}={}", format_value(value))])
        .collect()
}
