//! Lenient parsing of model replies that should be a single JSON object.

use serde_json::{Map, Value};

/// Trim whitespace and one optional leading ```` ```json ```` / ```` ``` ```` fence
/// plus a trailing ```` ``` ````.
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[derive(Debug)]
pub enum ObjectError {
    Syntax(serde_json::Error),
    NotAnObject(&'static str),
}

pub fn parse_object(raw: &str) -> Result<Map<String, Value>, ObjectError> {
    match serde_json::from_str::<Value>(strip_fences(raw)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ObjectError::NotAnObject(kind(&other))),
        Err(e) => Err(ObjectError::Syntax(e)),
    }
}

pub fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null      => "null",
        Value::Bool(_)   => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_)  => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_json_fence() {
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences("  ```\n{}\n```  "), "{}");
        assert_eq!(strip_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(parse_object("[1, 2]"), Err(ObjectError::NotAnObject("array"))));
        assert!(matches!(parse_object("not json"), Err(ObjectError::Syntax(_))));
        assert_eq!(parse_object("```json\n{\"k\": \"v\"}\n```").unwrap()["k"], "v");
    }
}
