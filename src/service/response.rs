//! Response field extraction
//!
//! RPC responses nest lists as `{"Things": {"Thing": [...]}}` and report
//! numbers either as JSON numbers or strings; these helpers paper over both.

use serde_json::Value;

/// Walk a dotted path (`"InstanceIdSets.InstanceIdSet.0"`)
pub fn lookup<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;

    for part in path.split('.') {
        // Handle array index
        current = match part.parse::<usize>() {
            Ok(idx) => current.get(idx)?,
            Err(_) => current.get(part)?,
        };
    }

    match current {
        Value::Null => None,
        v => Some(v),
    }
}

/// String at `path`; numbers and bools are rendered
pub fn string_at(item: &Value, path: &str) -> Option<String> {
    match lookup(item, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// String at `path`, empty when missing
pub fn str_or_empty(item: &Value, path: &str) -> String {
    string_at(item, path).unwrap_or_default()
}

/// Integer at `path`, accepting numeric strings
pub fn i64_at(item: &Value, path: &str) -> Option<i64> {
    match lookup(item, path)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Bool at `path`, accepting `"true"`/`"false"`
pub fn bool_at(item: &Value, path: &str) -> Option<bool> {
    match lookup(item, path)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Array at `path`, empty when missing
pub fn list_at<'a>(item: &'a Value, path: &str) -> &'a [Value] {
    match lookup(item, path) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Array of strings at `path`
pub fn strings_at(item: &Value, path: &str) -> Vec<String> {
    list_at(item, path)
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}
