//! Lenient JSON extraction from model output.
//!
//! Models wrap JSON in code fences or prose. [`extract_json`] finds the
//! payload: a fenced block first, otherwise the first balanced object, and
//! only then the first balanced array.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JsonError {
    #[error("no JSON found in response")]
    NotFound,

    #[error("JSON parse error: {0}")]
    Parse(String),
}

/// Returns the JSON substring of `response`, if any.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    if let Some(fenced) = from_code_block(trimmed) {
        return Some(fenced);
    }

    trimmed
        .find('{')
        .and_then(|start| balanced(trimmed, start, '{', '}'))
        .or_else(|| {
            trimmed
                .find('[')
                .and_then(|start| balanced(trimmed, start, '[', ']'))
        })
}

/// Parses the first JSON value in `response`.
pub fn parse_json(response: &str) -> Result<Value, JsonError> {
    let payload = extract_json(response).ok_or(JsonError::NotFound)?;
    serde_json::from_str(payload).map_err(|e| JsonError::Parse(e.to_string()))
}

/// Parses the first JSON object in `response`.
pub fn parse_object(response: &str) -> Result<serde_json::Map<String, Value>, JsonError> {
    match parse_json(response)? {
        Value::Object(map) => Ok(map),
        other => Err(JsonError::Parse(format!("expected object, got {}", kind(&other)))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn from_code_block(s: &str) -> Option<&str> {
    for pattern in ["```json\n", "```json\r\n", "```\n", "```\r\n"] {
        if let Some(start) = s.find(pattern) {
            let body = start + pattern.len();
            if let Some(end) = s[body..].find("```") {
                let block = s[body..body + end].trim();
                if block.starts_with('{') || block.starts_with('[') {
                    return Some(block);
                }
            }
        }
    }
    None
}

fn balanced(s: &str, start: usize, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, c) in s[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&s[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_object_inside_prose() {
        let text = "Hier ist das Ergebnis: {\"domain\": \"rwdr\", \"confidence\": 0.9} fertig.";
        assert_eq!(parse_json(text).unwrap(), json!({"domain": "rwdr", "confidence": 0.9}));
    }

    #[test]
    fn prefers_code_fence() {
        let text = "Text {kaputt\n```json\n{\"a\": 1}\n```";
        assert_eq!(parse_json(text).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn braces_inside_strings_do_not_close() {
        let text = r#"{"begruendung": "Dichtung {Typ} \"A\"", "n": 2} trailing"#;
        assert_eq!(parse_json(text).unwrap()["n"], json!(2));
    }

    #[test]
    fn multibyte_text_before_payload() {
        let text = "Öl äußerst: [1, 2]";
        assert_eq!(parse_json(text).unwrap(), json!([1, 2]));
    }

    #[test]
    fn object_wins_over_an_earlier_citation_bracket() {
        let text = r#"Quelle [1]: {"empfehlungen": [{"typ": "BAUM"}]}"#;
        assert_eq!(
            parse_object(text).unwrap()["empfehlungen"],
            json!([{"typ": "BAUM"}])
        );
    }

    #[test]
    fn missing_and_unbalanced() {
        assert_eq!(parse_json("kein json").unwrap_err(), JsonError::NotFound);
        assert_eq!(parse_json("{\"a\": 1").unwrap_err(), JsonError::NotFound);
        assert!(matches!(parse_object("[1]"), Err(JsonError::Parse(_))));
    }
}
