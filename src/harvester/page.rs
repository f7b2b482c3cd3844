// Record extraction from one API page

use serde_json::Value;

/// Records carried by one page body
///
/// - an array is the record list itself
/// - an object wraps the list in its first key, whatever it is called
/// - `null` is an empty page
/// - any other value is a single record
pub fn page_records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(map) => match map.into_iter().next() {
            Some((_, Value::Array(items))) => items,
            Some((_, Value::Null)) | None => Vec::new(),
            Some((_, other)) => vec![other],
        },
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
