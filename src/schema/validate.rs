//! Built-in field validators.

use crate::types::Value;

use super::field::Validator;

/// Rejects empty strings.
pub fn not_empty() -> Validator {
    Validator::new("not_empty", |value| match value {
        Value::String(s) if s.is_empty() => Err("value is empty".to_string()),
        _ => Ok(()),
    })
}

/// Rejects strings longer than `max` characters.
pub fn max_len(max: usize) -> Validator {
    Validator::new(format!("max_len({max})"), move |value| match value {
        Value::String(s) if s.chars().count() > max => {
            Err(format!("value is longer than {max} characters"))
        }
        _ => Ok(()),
    })
}

/// Accepts only the listed string values.
pub fn one_of(allowed: &[&str]) -> Validator {
    let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
    Validator::new("one_of", move |value| match value {
        Value::String(s) if !allowed.iter().any(|a| a == s) => Err(format!(
            "{s:?} is not one of [{}]",
            allowed.join(", ")
        )),
        _ => Ok(()),
    })
}

/// Accepts integers and floats within `min..=max`.
pub fn range(min: f64, max: f64) -> Validator {
    Validator::new(format!("range({min}, {max})"), move |value| {
        let v = match value {
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
            _ => return Ok(()),
        };
        if v < min || v > max {
            return Err(format!("{v} is out of range [{min}, {max}]"));
        }
        Ok(())
    })
}
