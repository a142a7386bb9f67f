use crate::types::{now_ms, Value};

/// Current time, for creation and update timestamps.
pub fn now() -> Value {
    Value::Time(now_ms())
}

/// Random UUID in hyphenated form.
pub fn new_id() -> Value {
    Value::String(uuid::Uuid::new_v4().to_string())
}
