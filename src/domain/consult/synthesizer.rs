//! Recommendation schema, prompts and the parse fallback chain.
//!
//! Model output is tried against three strategies in order:
//! 1. a balanced JSON payload with an `empfehlungen` list
//! 2. labeled markdown sections (`Typ:`, `Werkstoff:`, ...)
//! 3. the raw text prefix as a single unstructured recommendation
//!
//! The last strategy cannot fail, so synthesis always yields at least one
//! recommendation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::json::{parse_json, JsonError};
use super::state::ConsultState;

/// Fragment size when forwarding model output.
pub const STREAM_CHUNK_CHARS: usize = 160;

const RAW_FALLBACK_CHARS: usize = 600;
const NO_RECOMMENDATION: &str = "Keine strukturierte Empfehlung erhalten.";

/// One seal recommendation. Serialized with the German wire names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "typ", default)]
    pub kind: String,
    #[serde(rename = "werkstoff", default)]
    pub material: String,
    #[serde(rename = "begruendung", default)]
    pub justification: String,
    #[serde(rename = "vorteile", default)]
    pub advantages: Vec<String>,
    #[serde(rename = "einschraenkungen", default)]
    pub limitations: Vec<String>,
    #[serde(rename = "geeignet_fuer", default)]
    pub applicability: Vec<String>,
}

impl Recommendation {
    /// Lenient reading of one list entry: strings may stand in for lists
    /// and missing fields default to empty.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| match obj.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let list = |key: &str| match obj.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) => split_items(s),
            _ => Vec::new(),
        };
        let rec = Self {
            kind: text("typ"),
            material: text("werkstoff"),
            justification: text("begruendung"),
            advantages: list("vorteile"),
            limitations: list("einschraenkungen"),
            applicability: list("geeignet_fuer"),
        };
        (!rec.is_empty()).then_some(rec)
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_empty()
            && self.material.is_empty()
            && self.justification.is_empty()
            && self.advantages.is_empty()
            && self.limitations.is_empty()
            && self.applicability.is_empty()
    }

    /// "Typ (Werkstoff)" or whichever part is known.
    pub fn title(&self) -> String {
        match (self.kind.is_empty(), self.material.is_empty()) {
            (false, false) => format!("{} ({})", self.kind, self.material),
            (false, true) => self.kind.clone(),
            (true, false) => self.material.clone(),
            (true, true) => String::new(),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    empfehlungen: &'a [Recommendation],
}

/// Compact `{"empfehlungen":[...]}` payload stored as the assistant message.
pub fn to_payload(recs: &[Recommendation]) -> String {
    serde_json::to_string(&Envelope { empfehlungen: recs })
        .unwrap_or_else(|_| String::from("{\"empfehlungen\":[]}"))
}

/// Why a parse strategy did not produce recommendations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseFailure {
    #[error("empty model output")]
    Empty,

    #[error("no JSON payload: {0}")]
    Json(#[from] JsonError),

    #[error("JSON payload has no recommendations")]
    NoRecommendations,

    #[error("no labeled markdown sections")]
    NoSections,
}

/// Which strategy produced the recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseLevel {
    Json,
    Markdown,
    RawText,
}

/// Strategy 1: `{"empfehlungen": [...]}` anywhere in the text.
pub fn parse_json_recommendations(raw: &str) -> Result<Vec<Recommendation>, ParseFailure> {
    if raw.trim().is_empty() {
        return Err(ParseFailure::Empty);
    }
    let value = parse_json(raw)?;
    let recs: Vec<Recommendation> = value
        .get("empfehlungen")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Recommendation::from_value).collect())
        .unwrap_or_default();
    if recs.is_empty() {
        return Err(ParseFailure::NoRecommendations);
    }
    Ok(recs)
}

static TYPE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*Typ:\s*(.+?)\s*$").expect("static type pattern"));
static MATERIAL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*Werkstoff:\s*(.+?)\s*$").expect("static material pattern"));
static ADVANTAGES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)\bVorteile:\s*(.+?)(?:\n\s*(?:Einschr[aä]nkungen|Begr[üu]ndung|Abgeleiteter|Alternativen)\b|$)",
    )
    .expect("static advantages pattern")
});
static LIMITATIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bEinschr[aä]nkungen:\s*(.+?)(?:\n\s*(?:Begr[üu]ndung|Abgeleiteter|Alternativen)\b|$)")
        .expect("static limitations pattern")
});
static JUSTIFICATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bBegr[üu]ndung:\s*(.+?)(?:\n\s*(?:Abgeleiteter|Alternativen)\b|$)")
        .expect("static justification pattern")
});
static BULLETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[•\-\u{2013}\u{2014}]\s*").expect("static bullet pattern"));
static ITEM_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[;,]\s*|\s{2,}").expect("static separator pattern"));

fn section(re: &Regex, text: &str) -> String {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Splits a list section on separators, bullets and dashes.
pub fn split_items(text: &str) -> Vec<String> {
    let normalized = BULLETS.replace_all(text, ", ");
    ITEM_SEPARATORS
        .split(normalized.trim())
        .map(|part| part.trim_matches(|c: char| c == ' ' || c == '.').trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Strategy 2: one recommendation from labeled markdown lines.
pub fn parse_markdown(raw: &str) -> Result<Recommendation, ParseFailure> {
    if raw.trim().is_empty() {
        return Err(ParseFailure::Empty);
    }
    let rec = Recommendation {
        kind: section(&TYPE_LINE, raw),
        material: section(&MATERIAL_LINE, raw),
        justification: section(&JUSTIFICATION, raw),
        advantages: split_items(&section(&ADVANTAGES, raw)),
        limitations: split_items(&section(&LIMITATIONS, raw)),
        applicability: Vec::new(),
    };
    if rec.is_empty() {
        return Err(ParseFailure::NoSections);
    }
    Ok(rec)
}

/// Strategy 3: the raw prefix as justification. Never fails.
pub fn raw_fallback(raw: &str) -> Recommendation {
    let raw = raw.trim();
    let justification = if raw.is_empty() {
        NO_RECOMMENDATION.to_string()
    } else {
        raw.chars().take(RAW_FALLBACK_CHARS).collect()
    };
    Recommendation {
        justification,
        ..Recommendation::default()
    }
}

/// Runs the fallback chain. The failures of skipped strategies are
/// returned for logging.
pub fn parse_recommendations(raw: &str) -> (Vec<Recommendation>, ParseLevel, Vec<ParseFailure>) {
    let mut failures = Vec::new();
    match parse_json_recommendations(raw) {
        Ok(recs) => return (recs, ParseLevel::Json, failures),
        Err(e) => failures.push(e),
    }
    match parse_markdown(raw) {
        Ok(rec) => return (vec![rec], ParseLevel::Markdown, failures),
        Err(e) => failures.push(e),
    }
    (vec![raw_fallback(raw)], ParseLevel::RawText, failures)
}

/// Splits `text` into pieces of at most `max_chars` characters.
pub fn chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            out.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// System prompt framing the seal expert for `domain`.
pub fn system_prompt(domain: &str) -> String {
    let focus = match domain {
        "hydraulics_rod" => "Hydraulik-Stangendichtungen (Nutgeometrie, Extrusion, Stick-Slip)",
        _ => "Radialwellendichtringe (Umfangsgeschwindigkeit, Druckbelastung, Werkstoffe)",
    };
    format!(
        "Du bist ein erfahrener Anwendungsingenieur für Dichtungstechnik mit Schwerpunkt {focus}. \
         Du empfiehlst nur Lösungen, die zu den genannten Betriebsdaten passen, und benennst \
         Einschränkungen offen."
    )
}

/// User-facing task prompt with params, derived values and evidence.
pub fn recommendation_prompt(state: &ConsultState) -> String {
    let params = serde_json::to_string(&state.params).unwrap_or_default();
    let derived = serde_json::to_string(&state.derived).unwrap_or_default();
    let context = if state.context.trim().is_empty() {
        "(kein Kontext gefunden)"
    } else {
        state.context.as_str()
    };
    format!(
        "Domäne: {domain}\n\
         Letzte Nutzeranfrage: {user}\n\
         Parameter: {params}\n\
         Berechnete Werte: {derived}\n\
         Kontext:\n{context}\n\n\
         Antworte ausschließlich mit JSON im Format \
         {{\"empfehlungen\": [{{\"typ\": str, \"werkstoff\": str, \"begruendung\": str, \
         \"vorteile\": [str], \"einschraenkungen\": [str], \"geeignet_fuer\": [str]}}]}}. \
         Die erste Empfehlung ist die Hauptempfehlung, weitere sind Alternativen.",
        domain = state.domain_id().unwrap_or("rwdr"),
        user = state.last_user_text(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    mod json_level {
        use super::*;

        #[test]
        fn parses_wrapped_payload() {
            let raw = "Hier die Empfehlung:\n```json\n{\"empfehlungen\": [{\"typ\": \"BAUM\", \"werkstoff\": \"FKM\", \
                       \"begruendung\": \"Öl bei 80 °C\", \"vorteile\": [\"beständig\"], \
                       \"einschraenkungen\": \"teurer; nicht für Dampf\"}]}\n```";
            let (recs, level, failures) = parse_recommendations(raw);
            assert_eq!(level, ParseLevel::Json);
            assert!(failures.is_empty());
            assert_eq!(recs.len(), 1);
            assert_eq!(recs[0].title(), "BAUM (FKM)");
            assert_eq!(recs[0].limitations, vec!["teurer", "nicht für Dampf"]);
        }

        #[test]
        fn citation_marker_before_payload_keeps_json_level() {
            let raw = "Laut Quelle [1]: {\"empfehlungen\": [{\"typ\": \"BAUM\", \"werkstoff\": \"NBR\"}]}";
            let (recs, level, _) = parse_recommendations(raw);
            assert_eq!(level, ParseLevel::Json);
            assert_eq!(recs[0].material, "NBR");
        }

        #[test]
        fn empty_list_is_a_failure() {
            assert_eq!(
                parse_json_recommendations("{\"empfehlungen\": []}").unwrap_err(),
                ParseFailure::NoRecommendations
            );
        }

        #[test]
        fn payload_uses_wire_names() {
            let rec = Recommendation {
                kind: "BA".into(),
                material: "NBR".into(),
                ..Recommendation::default()
            };
            let payload = to_payload(&[rec]);
            assert!(payload.starts_with("{\"empfehlungen\":[{\"typ\":\"BA\",\"werkstoff\":\"NBR\""));
            assert_eq!(to_payload(&[]), "{\"empfehlungen\":[]}");
        }
    }

    mod markdown_level {
        use super::*;

        #[test]
        fn labeled_sections_are_coerced() {
            let raw = "Typ: BAUM\nWerkstoff: FKM\nVorteile: • hohe Temperaturbeständigkeit • gute Ölbeständigkeit\n\
                       Einschränkungen: teurer als NBR.\nBegründung: Öl bei 110 °C.\nAlternativen: keine";
            let (recs, level, failures) = parse_recommendations(raw);
            assert_eq!(level, ParseLevel::Markdown);
            assert_eq!(failures.len(), 1);
            let rec = &recs[0];
            assert_eq!(rec.kind, "BAUM");
            assert_eq!(rec.material, "FKM");
            assert_eq!(
                rec.advantages,
                vec!["hohe Temperaturbeständigkeit", "gute Ölbeständigkeit"]
            );
            assert_eq!(rec.limitations, vec!["teurer als NBR"]);
            assert_eq!(rec.justification, "Öl bei 110 °C.");
        }

        #[test]
        fn split_items_handles_dashes_and_wide_gaps() {
            assert_eq!(split_items("- a - b;c  d."), vec!["a", "b", "c", "d"]);
        }
    }

    mod raw_level {
        use super::*;

        #[test]
        fn unstructured_text_is_truncated() {
            let raw = "x".repeat(1000);
            let (recs, level, failures) = parse_recommendations(&raw);
            assert_eq!(level, ParseLevel::RawText);
            assert_eq!(failures.len(), 2);
            assert_eq!(recs[0].justification.chars().count(), 600);
        }

        #[test]
        fn empty_text_gets_placeholder() {
            let (recs, _, _) = parse_recommendations("  ");
            assert_eq!(recs[0].justification, "Keine strukturierte Empfehlung erhalten.");
        }
    }

    #[test]
    fn chunks_respect_char_boundaries() {
        let text = "äöü".repeat(100);
        let parts = chunks(&text, 160);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].chars().count(), 160);
        assert_eq!(parts.concat(), text);
        assert!(chunks("", 160).is_empty());
    }
}
