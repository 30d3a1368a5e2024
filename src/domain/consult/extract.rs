//! Text-to-parameter extraction.
//!
//! Two strategies run in order: a pure regex pass over the user text and a
//! model pass whose JSON answer is parsed here. Results are merged
//! seed-first: a later strategy only fills keys that are still blank.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::json::{parse_object, JsonError};
use super::params::{self, number_value, parse_number, Params};

/// Why the model extraction produced nothing usable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractError {
    #[error("extraction call failed: {0}")]
    Provider(String),

    #[error("extraction response unusable: {0}")]
    Json(#[from] JsonError),

    #[error("extraction response contained no parameters")]
    Empty,
}

/// Keys coerced to numbers when the model returns them as strings.
pub const NUMERIC_KEYS: &[&str] = &[
    "wellen_mm",
    "gehause_mm",
    "breite_mm",
    "stange_mm",
    "nut_d_mm",
    "nut_b_mm",
    "temp_max_c",
    "temp_min_c",
    "druck_bar",
    "drehzahl_u_min",
    "geschwindigkeit_m_s",
    "relativgeschwindigkeit_ms",
];

const NUM: &str = r"(-?\d+(?:[.,]\d+)?)";

fn rx(pattern: &str) -> Regex {
    Regex::new(&pattern.replace("{NUM}", NUM)).expect("static extraction pattern")
}

static DIMENSIONS: Lazy<Regex> =
    Lazy::new(|| rx(r"(?i)\b(\d{1,4}(?:[.,]\d+)?)\s*[x×*]\s*(\d{1,4}(?:[.,]\d+)?)\s*[x×*]\s*(\d{1,4}(?:[.,]\d+)?)"));
static SHAFT: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bwelle(?:n(?:durchmesser)?)?\s*(?:d\s*)?[:=]?\s*{NUM}"));
static HOUSING: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bgeh(?:ä|ae|a)use\s*[:=]?\s*{NUM}"));
static WIDTH: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bbreite\s*[:=]?\s*{NUM}"));
static ROD: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bstange(?:n(?:durchmesser)?)?\s*[:=]?\s*{NUM}"));
static GROOVE_D: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bnut(?:-?\s*ø)?\s*d\s*[:=]?\s*{NUM}"));
static GROOVE_B: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bnut(?:breite|\s*b)\s*[:=]?\s*{NUM}"));

static HYDRAULIC_OIL: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bhydraulik\s?(?:ö|oe)l\b"));
static OIL: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\b(?:öl|oel)\b"));
static WATER: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bwasser\b"));
static MEDIUM_LABEL: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bmedium\s*[:=]\s*([^,;\n]{2,40})"));

static TEMP_LABELED: Lazy<Regex> =
    Lazy::new(|| rx(r"(?i)\b(?:t\s*max|temp(?:eratur)?(?:\s*max)?)\s*[:=]?\s*{NUM}(?:\s*°?\s*c\b)?"));
static TEMP_UNIT: Lazy<Regex> = Lazy::new(|| rx(r"(?i){NUM}\s*°\s*c\b"));

static NO_PRESSURE: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\b(?:kein(?:en)?|ohne)\s+(?:über)?druck\b"));
static PRESSURE: Lazy<Regex> = Lazy::new(|| rx(r"(?i){NUM}\s*bar\b"));

static RPM_CONTINUOUS: Lazy<Regex> =
    Lazy::new(|| rx(r"(?i)\bdauerhaft\s*(?:bei\s*)?(\d{1,7})\s*(?:u/?min|rpm)\b"));
static RPM_LABELED: Lazy<Regex> =
    Lazy::new(|| rx(r"(?i)\b(?:n|drehzahl)\s*[:=]?\s*(\d{1,7})(?:\s*(?:u/?min|rpm))?\b"));
static RPM_UNIT: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\b(\d{1,7})\s*(?:u/?min|rpm)\b"));

static SPEED: Lazy<Regex> =
    Lazy::new(|| rx(r"(?i)\b(?:v|geschwindigkeit)\s*[:=]?\s*{NUM}\s*m/s"));

static BAUFORM_LABELED: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bbauform\s*[:=]?\s*([a-z0-9]{1,6})\b"));
static BAUFORM_CODE: Lazy<Regex> = Lazy::new(|| rx(r"\b(BA[A-Z0-9]{0,5})\b"));

static CASE_REPLACEMENT: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bersatz(?:teil)?\b"));
static CASE_NEW: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bneu(?:auslegung|konstruktion)?\b"));

fn capture_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_number(m.as_str()))
}

fn put(out: &mut Params, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        out.insert(key.to_string(), number_value(value));
    }
}

/// Regex pass over free text. Pure and infallible.
pub fn heuristic(text: &str) -> Params {
    let mut out = Params::new();
    if text.trim().is_empty() {
        return out;
    }

    if let Some(caps) = DIMENSIONS.captures(text) {
        let dims: Vec<Option<f64>> = (1..=3)
            .map(|i| caps.get(i).and_then(|m| parse_number(m.as_str())))
            .collect();
        put(&mut out, "wellen_mm", dims[0]);
        put(&mut out, "gehause_mm", dims[1]);
        put(&mut out, "breite_mm", dims[2]);
    } else {
        put(&mut out, "wellen_mm", capture_number(&SHAFT, text));
        put(&mut out, "gehause_mm", capture_number(&HOUSING, text));
        put(&mut out, "breite_mm", capture_number(&WIDTH, text));
    }
    put(&mut out, "stange_mm", capture_number(&ROD, text));
    put(&mut out, "nut_d_mm", capture_number(&GROOVE_D, text));
    put(&mut out, "nut_b_mm", capture_number(&GROOVE_B, text));

    let medium = if HYDRAULIC_OIL.is_match(text) {
        Some("Hydrauliköl".to_string())
    } else if OIL.is_match(text) {
        Some("Öl".to_string())
    } else if WATER.is_match(text) {
        Some("Wasser".to_string())
    } else {
        MEDIUM_LABEL
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|m| !m.is_empty())
    };
    if let Some(medium) = medium {
        out.insert("medium".into(), Value::String(medium));
    }

    put(
        &mut out,
        "temp_max_c",
        capture_number(&TEMP_LABELED, text).or_else(|| capture_number(&TEMP_UNIT, text)),
    );

    let pressure = if NO_PRESSURE.is_match(text) {
        Some(0.0)
    } else {
        capture_number(&PRESSURE, text)
    };
    put(&mut out, "druck_bar", pressure);

    put(
        &mut out,
        "drehzahl_u_min",
        capture_number(&RPM_CONTINUOUS, text)
            .or_else(|| capture_number(&RPM_LABELED, text))
            .or_else(|| capture_number(&RPM_UNIT, text)),
    );

    put(&mut out, "geschwindigkeit_m_s", capture_number(&SPEED, text));

    let bauform = BAUFORM_LABELED
        .captures(text)
        .or_else(|| BAUFORM_CODE.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase());
    if let Some(bauform) = bauform {
        out.insert("bauform".into(), Value::String(bauform));
    }

    if CASE_REPLACEMENT.is_match(text) {
        out.insert("falltyp".into(), Value::String("ersatz".into()));
    } else if CASE_NEW.is_match(text) {
        out.insert("falltyp".into(), Value::String("neu".into()));
    }

    out
}

/// System prompt for the model extraction pass.
pub fn extraction_prompt(known: &Params) -> String {
    let known = serde_json::to_string(known).unwrap_or_else(|_| "{}".into());
    format!(
        "Du extrahierst technische Parameter für die Auslegung von Dichtungen aus der \
         Nutzernachricht. Antworte ausschließlich mit einem JSON-Objekt. Erlaubte Schlüssel: \
         falltyp, wellen_mm, gehause_mm, breite_mm, stange_mm, nut_d_mm, nut_b_mm, medium, \
         temp_min_c, temp_max_c, druck_bar, drehzahl_u_min, geschwindigkeit_m_s, bauform, \
         profil. Lass unbekannte Werte weg. Bereits bekannt: {known}"
    )
}

/// Parses the model's extraction answer into normalized params.
pub fn parse_model_params(response: &str) -> Result<Params, ExtractError> {
    let raw = parse_object(response)?;
    let mut out = Params::new();
    for (key, value) in raw {
        if params::is_blank(&value) || key == "source" {
            continue;
        }
        let value = if NUMERIC_KEYS.contains(&key.as_str()) {
            match params::as_f64(&value) {
                Some(n) => number_value(n),
                None => continue,
            }
        } else {
            value
        };
        out.insert(key, value);
    }
    if out.is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(out)
}

/// Values from `incoming` for keys that are blank in `seed`.
pub fn fill_blanks(seed: &Params, incoming: &Params) -> Params {
    incoming
        .iter()
        .filter(|(k, v)| !params::is_blank(v) && params::is_unset(seed, k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod heuristic {
        use super::*;

        #[test]
        fn dimensions_with_decimal_commas() {
            let out = heuristic("RWDR 25x47x7 bzw. 25,5 × 47 * 7");
            assert_eq!(out["wellen_mm"], json!(25.0));
            assert_eq!(out["gehause_mm"], json!(47.0));
            assert_eq!(out["breite_mm"], json!(7.0));

            let out = heuristic("25,5 × 47 * 7");
            assert_eq!(out["wellen_mm"], json!(25.5));
        }

        #[test]
        fn full_rwdr_sentence() {
            let out = heuristic("Welle 25, Gehäuse 47, Breite 7, Medium Öl, Tmax 80, Druck 2 bar, n 1500");
            assert_eq!(out["wellen_mm"], json!(25.0));
            assert_eq!(out["gehause_mm"], json!(47.0));
            assert_eq!(out["breite_mm"], json!(7.0));
            assert_eq!(out["medium"], json!("Öl"));
            assert_eq!(out["temp_max_c"], json!(80.0));
            assert_eq!(out["druck_bar"], json!(2.0));
            assert_eq!(out["drehzahl_u_min"], json!(1500.0));
            assert!(!out.contains_key("bauform"));
        }

        #[test]
        fn hydraulic_rod_sentence() {
            let out = heuristic("Stange 25, Nut D 32, Nut B 6, Hydrauliköl, 160 bar, v 0,3 m/s, Ersatz");
            assert_eq!(out["stange_mm"], json!(25.0));
            assert_eq!(out["nut_d_mm"], json!(32.0));
            assert_eq!(out["nut_b_mm"], json!(6.0));
            assert_eq!(out["medium"], json!("Hydrauliköl"));
            assert_eq!(out["druck_bar"], json!(160.0));
            assert_eq!(out["geschwindigkeit_m_s"], json!(0.3));
            assert_eq!(out["falltyp"], json!("ersatz"));
        }

        #[test]
        fn no_pressure_means_zero() {
            let out = heuristic("Wasser, ohne Druck, 90 °C");
            assert_eq!(out["druck_bar"], json!(0.0));
            assert_eq!(out["medium"], json!("Wasser"));
            assert_eq!(out["temp_max_c"], json!(90.0));
        }

        #[test]
        fn continuous_speed_wins() {
            let out = heuristic("kurzzeitig 6000 U/min, dauerhaft 3000 U/min");
            assert_eq!(out["drehzahl_u_min"], json!(3000.0));
        }

        #[test]
        fn bauform_code_is_case_sensitive() {
            assert_eq!(heuristic("BAUM 30x52x7")["bauform"], json!("BAUM"));
            assert!(!heuristic("bei 5 bar").contains_key("bauform"));
        }

        #[test]
        fn empty_text_yields_nothing() {
            assert!(heuristic("   ").is_empty());
            assert!(heuristic("Hallo zusammen").is_empty());
        }
    }

    mod model {
        use super::*;

        #[test]
        fn numbers_are_coerced_and_blanks_dropped() {
            let out = parse_model_params(
                "```json\n{\"wellen_mm\": \"25,0\", \"medium\": \"Öl\", \"druck_bar\": null, \"temp_max_c\": \"heiß\"}\n```",
            )
            .unwrap();
            assert_eq!(out["wellen_mm"], json!(25.0));
            assert_eq!(out["medium"], json!("Öl"));
            assert!(!out.contains_key("druck_bar"));
            assert!(!out.contains_key("temp_max_c"));
        }

        #[test]
        fn failures_are_typed() {
            assert_eq!(
                parse_model_params("keine Angaben").unwrap_err(),
                ExtractError::Json(JsonError::NotFound)
            );
            assert_eq!(parse_model_params("{\"medium\": \"\"}").unwrap_err(), ExtractError::Empty);
        }
    }

    #[test]
    fn fill_blanks_never_overrides_seed() {
        let seed = json!({"medium": "Öl", "druck_bar": ""}).as_object().cloned().unwrap();
        let incoming = json!({"medium": "Wasser", "druck_bar": 3, "breite_mm": 7})
            .as_object()
            .cloned()
            .unwrap();
        let patch = fill_blanks(&seed, &incoming);
        assert!(!patch.contains_key("medium"));
        assert_eq!(patch["druck_bar"], json!(3));
        assert_eq!(patch["breite_mm"], json!(7));
    }
}
