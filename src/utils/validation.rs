//! Field checks shared by request handlers.

use serde_json::Value;
use uuid::Uuid;

/// Identifiers are UUIDs generated at insert time.
pub fn is_valid_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Trimmed value when present and not blank.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Integer rating in 1..=5, given as a JSON number or a numeric string.
pub fn rating(value: &Value) -> Option<u8> {
    let rating = match value {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    u8::try_from(rating).ok().filter(|r| (1..=5).contains(r))
}
