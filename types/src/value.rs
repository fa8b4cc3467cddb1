//! Presence and membership helpers over JSON values.
//!
//! Missing, `null`, empty, and `false` are all treated as absent. Numbers are
//! always present, including zero. An array is present only when it is
//! non-empty and every element is present.

use serde_json::Value;

#[must_use]
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(_) => true,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty() && items.iter().all(is_present),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Membership test that adapts to the container's shape.
///
/// - string: substring test (element must be a string)
/// - array: element equality
/// - object: element names a key whose value is present
/// - scalar: equality
#[must_use]
pub fn contains(container: &Value, element: &Value) -> bool {
    match container {
        Value::String(haystack) => element
            .as_str()
            .is_some_and(|needle| haystack.contains(needle)),
        Value::Array(items) => items.contains(element),
        Value::Object(map) => element
            .as_str()
            .and_then(|key| map.get(key))
            .is_some_and(is_present),
        _ => container == element,
    }
}

/// Presence of `value`, refined by membership of `element` when both are present.
#[must_use]
pub fn has(value: &Value, element: &Value) -> bool {
    if is_present(value) && is_present(element) {
        contains(value, element)
    } else {
        is_present(value)
    }
}

/// Object entries, or nothing for any other shape.
pub fn fields(value: &Value) -> impl Iterator<Item = (&String, &Value)> {
    value.as_object().into_iter().flat_map(|map| map.iter())
}

/// `value` unless it is zero; a zero fallback is promoted to one.
#[must_use]
pub const fn non_zero(value: u64, fallback: u64) -> u64 {
    if value != 0 {
        value
    } else if fallback == 0 {
        1
    } else {
        fallback
    }
}
