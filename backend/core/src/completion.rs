use serde_json::Value;

use crate::error::ChatError;

/// Collapse a raw model output into a single string.
///
/// Accepts a plain string or an array of string fragments (joined in order,
/// the shape streaming predictions come back in). Null, numbers, objects, and
/// arrays holding non-strings are rejected.
pub fn normalize_completion(raw: &Value) -> Result<String, ChatError> {
    match raw {
        Value::String(text) => Ok(text.clone()),
        Value::Array(fragments) => {
            let mut out = String::new();
            for fragment in fragments {
                match fragment {
                    Value::String(s) => out.push_str(s),
                    other => {
                        return Err(ChatError::Generation(format!(
                            "unexpected completion fragment of type {}",
                            type_name(other)
                        )))
                    }
                }
            }
            Ok(out)
        }
        other => Err(ChatError::Generation(format!(
            "unexpected completion payload of type {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
