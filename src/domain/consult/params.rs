//! Parameter map helpers.
//!
//! Parameters arrive from free text, model output and client forms, so a
//! value may be a JSON number, a numeric string with a decimal comma, or a
//! placeholder such as `"unknown"`. These helpers give every consumer the
//! same reading of "empty" and "numeric".

use serde_json::{Map, Value};

/// Field name to value map accumulated across turns.
pub type Params = Map<String, Value>;

/// True for values that carry no information: null, blank strings,
/// `"unknown"`, and empty arrays/objects.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case("unknown")
        }
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// True when the key is absent or blank.
pub fn is_unset(params: &Params, key: &str) -> bool {
    params.get(key).map_or(true, is_blank)
}

/// Best-effort numeric reading. Booleans are never numbers.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Parses `"2,5"`, `" 80 "` and `"1500"`; rejects anything else.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Numeric value for `key`, if present and parsable.
pub fn number(params: &Params, key: &str) -> Option<f64> {
    params.get(key).and_then(as_f64)
}

/// First parsable numeric value among `keys`.
pub fn first_number(params: &Params, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| number(params, k))
}

/// Trimmed string value, numbers rendered without a trailing `.0`.
pub fn text(params: &Params, key: &str) -> Option<String> {
    let value = params.get(key)?;
    if is_blank(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(format_number(n.as_f64()?)),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Truthiness of acknowledgement flags coming from forms.
pub fn flag(params: &Params, key: &str) -> bool {
    match params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "ja" | "yes" | "ok"
        ),
        _ => false,
    }
}

/// Renders `80.0` as `80` and `0.3` as `0.3`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// All non-blank entries, used as form prefill.
pub fn non_blank(params: &Params) -> Params {
    params
        .iter()
        .filter(|(_, v)| !is_blank(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// JSON number for an `f64`, falling back to null for NaN/inf.
pub fn number_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_values() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!("")));
        assert!(is_blank(&json!("  Unknown ")));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!("Öl")));
    }

    #[test]
    fn numeric_strings_accept_decimal_comma() {
        assert_eq!(as_f64(&json!("0,3")), Some(0.3));
        assert_eq!(as_f64(&json!(" 80 ")), Some(80.0));
        assert_eq!(as_f64(&json!("abc")), None);
        assert_eq!(as_f64(&json!(true)), None);
    }

    #[test]
    fn text_renders_integers_without_fraction() {
        let params = json!({"a": 80.0, "b": " Öl ", "c": ""});
        let params = params.as_object().unwrap();
        assert_eq!(text(params, "a").as_deref(), Some("80"));
        assert_eq!(text(params, "b").as_deref(), Some("Öl"));
        assert_eq!(text(params, "c"), None);
    }

    #[test]
    fn flags_accept_form_strings() {
        let params = json!({"a": "ja", "b": false, "c": 1});
        let params = params.as_object().unwrap();
        assert!(flag(params, "a"));
        assert!(!flag(params, "b"));
        assert!(flag(params, "c"));
        assert!(!flag(params, "missing"));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.963495, 3), 1.963);
        assert_eq!(format_number(1500.0), "1500");
    }
}
