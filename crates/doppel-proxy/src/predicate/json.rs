//! Structured JSON comparison for body matchers.

use serde_json::Value;

/// Whether `actual` contains `expected`: every expected object key must be present
/// with a matching value; arrays compare element-wise and must have equal length.
pub fn json_subset(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected.iter().all(|(key, value)| {
            actual
                .get(key)
                .is_some_and(|actual_value| json_subset(actual_value, value))
        }),
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len()
                && actual
                    .iter()
                    .zip(expected.iter())
                    .all(|(a, e)| json_subset(a, e))
        }
        (actual, expected) => actual == expected,
    }
}

/// Canonical text of a JSON body (object keys sorted), or `None` if it is not JSON.
pub fn canonical_json(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    serde_json::to_string(&value).ok()
}
