//! Minimal JSON-Schema checking for tool arguments.
//!
//! Covers what tool schemas in this workspace declare: a top-level object,
//! `required` keys, primitive property `type`s and `enum` membership.
//! Anything else in the schema is accepted as-is.

use serde_json::Value;

/// Validate `args` against a tool parameter schema.
///
/// Returns a human-readable description of the first violation.
pub fn validate(schema: &Value, args: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, args) {
            return Err(format!(
                "expected arguments of type {expected}, got {}",
                type_name(args)
            ));
        }
    }

    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if obj.get(key).is_none_or(Value::is_null) {
                return Err(format!("missing required parameter '{key}'"));
            }
        }
    }

    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (key, value) in obj {
        let Some(prop) = props.get(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let Some(expected) = prop.get("type").and_then(Value::as_str) {
            if !type_matches(expected, value) {
                return Err(format!(
                    "parameter '{key}' must be of type {expected}, got {}",
                    type_name(value)
                ));
            }
        }
        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(format!("parameter '{key}' must be one of {}", Value::Array(allowed.clone())));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
