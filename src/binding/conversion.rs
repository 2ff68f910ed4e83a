//! Raw string to scalar conversion.

use serde_json::{Number, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::metadata::{ModelMetadata, ScalarKind};

/// Convert one raw value for `metadata`, producing the user-facing message on
/// failure. `key` names the field in that message.
pub(crate) fn convert_scalar(
    raw: &str,
    kind: ScalarKind,
    metadata: &ModelMetadata,
    key: &str,
) -> Result<Value, String> {
    if kind == ScalarKind::Text {
        return Ok(Value::String(raw.to_string()));
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return if metadata.is_nullable() {
            Ok(Value::Null)
        } else {
            Err(format!("A value is required for {}.", display_name(key)))
        };
    }

    let invalid = || format!("The value '{raw}' is not valid for {}.", display_name(key));
    match kind {
        ScalarKind::Text => Ok(Value::String(raw.to_string())),
        ScalarKind::Boolean => parse_bool(trimmed).map(Value::Bool).ok_or_else(invalid),
        ScalarKind::Integer => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid()),
        ScalarKind::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        ScalarKind::Uuid => Uuid::parse_str(trimmed)
            .map(|uuid| Value::String(uuid.to_string()))
            .map_err(|_| invalid()),
        ScalarKind::DateTime => OffsetDateTime::parse(trimmed, &Rfc3339)
            .ok()
            .and_then(|parsed| parsed.format(&Rfc3339).ok())
            .map(Value::String)
            .ok_or_else(invalid),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("on") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") || raw.eq_ignore_ascii_case("off") {
        Some(false)
    } else {
        None
    }
}

/// Last path segment of a binding key: `person.address[0].zip` -> `zip`.
pub(crate) fn display_name(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}
