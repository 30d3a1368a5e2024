//! Markdown explanation of a recommendation and the values behind it.

use serde_json::Value;

use super::json::parse_json;
use super::params::{self, format_number, round_to, Params};
use super::registry::DomainSpec;
use super::state::Derived;
use super::synthesizer::Recommendation;

/// Fragment size when streaming the rendered explanation.
pub const EXPLAIN_CHUNK_CHARS: usize = 180;

/// Calculated values shown to the user, with label and unit.
const SHOWN_VALUES: &[(&str, &str, &str)] = &[
    ("surface_speed_m_s", "Umfangsgeschwindigkeit", "m/s"),
    ("omega_rad_s", "Winkelgeschwindigkeit", "rad/s"),
    ("p_mpa", "Druck", "MPa"),
    ("pv_bar_ms", "PV-Wert", "bar·m/s"),
    ("pv_mpa_ms", "PV-Wert", "MPa·m/s"),
    ("pv_indicator_bar_ms", "PV-Indikator", "bar·m/s"),
    ("friction_force_n", "Reibkraft", "N"),
    ("friction_power_w", "Reibleistung", "W"),
];

/// Main recommendation, alternatives and free-form notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Explanation {
    pub main: Option<Recommendation>,
    pub alternatives: Vec<Recommendation>,
    pub notes: Vec<String>,
}

impl Explanation {
    pub fn from_recommendations(recs: &[Recommendation]) -> Self {
        let mut iter = recs.iter().cloned();
        Self {
            main: iter.next(),
            alternatives: iter.collect(),
            notes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.alternatives.is_empty()
    }

    /// Reads a previous assistant answer. Accepts `{"empfehlungen": [...]}`,
    /// `{"main", "alternativen", "hinweise"}` and either of those wrapped as
    /// a JSON string under `"text"`.
    pub fn from_assistant_text(text: &str) -> Option<Self> {
        let mut value = parse_json(text).ok()?;
        if let Some(inner) = value.get("text").and_then(Value::as_str) {
            if let Ok(parsed) = parse_json(inner) {
                value = parsed;
            }
        }
        let obj = value.as_object()?;
        let notes = strings(obj.get("hinweise"));

        if obj.contains_key("main") || obj.contains_key("alternativen") {
            let explanation = Self {
                main: obj.get("main").and_then(Recommendation::from_value),
                alternatives: list(obj.get("alternativen")),
                notes,
            };
            return (!explanation.is_empty()).then_some(explanation);
        }

        let recs = list(obj.get("empfehlungen"));
        if recs.is_empty() {
            return None;
        }
        Some(Self {
            notes,
            ..Self::from_recommendations(&recs)
        })
    }
}

fn list(value: Option<&Value>) -> Vec<Recommendation> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Recommendation::from_value).collect())
        .unwrap_or_default()
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Everything the explanation is rendered from.
pub struct ExplainInput<'a> {
    pub explanation: &'a Explanation,
    pub derived: &'a Derived,
    pub params: &'a Params,
    pub spec: Option<&'a DomainSpec>,
    pub sources: &'a [String],
}

/// Renders the explanation as Markdown.
pub fn render(input: &ExplainInput<'_>) -> String {
    let mut out = String::new();
    let ExplainInput {
        explanation,
        derived,
        params,
        spec,
        sources,
    } = input;

    match &explanation.main {
        Some(main) => {
            out.push_str("### Empfehlung\n");
            let title = main.title();
            if !title.is_empty() {
                out.push_str(&format!("**{}**\n\n", title));
            }
            if !main.justification.is_empty() {
                out.push_str(&main.justification);
                out.push_str("\n\n");
            }
            push_list(&mut out, "Vorteile", &main.advantages);
            push_list(&mut out, "Einschränkungen", &main.limitations);
            push_list(&mut out, "Geeignet für", &main.applicability);
        }
        None => {
            out.push_str("### Einordnung\n");
            out.push_str(
                "Für eine konkrete Empfehlung reichen die vorliegenden Unterlagen noch nicht aus. \
                 Hier die bisherige technische Einordnung.\n\n",
            );
        }
    }

    if !explanation.alternatives.is_empty() {
        out.push_str("### Alternativen\n");
        for alt in &explanation.alternatives {
            let title = alt.title();
            match (title.is_empty(), alt.justification.is_empty()) {
                (false, false) => out.push_str(&format!("- **{}**: {}\n", title, alt.justification)),
                (false, true) => out.push_str(&format!("- **{}**\n", title)),
                (true, _) => out.push_str(&format!("- {}\n", alt.justification)),
            }
        }
        out.push('\n');
    }

    let notes: Vec<&String> = explanation
        .notes
        .iter()
        .chain(derived.warnings.iter())
        .chain(derived.requirements.iter())
        .collect();
    if !notes.is_empty() {
        out.push_str("### Hinweise\n");
        for note in notes {
            out.push_str(&format!("- {}\n", note));
        }
        out.push('\n');
    }

    let values: Vec<String> = SHOWN_VALUES
        .iter()
        .filter_map(|(key, label, unit)| {
            derived
                .value(key)
                .map(|v| format!("- {}: {} {}", label, format_number(round_to(v, 3)), unit))
        })
        .collect();
    if !values.is_empty() {
        out.push_str("### Berechnete Werte\n");
        out.push_str(&values.join("\n"));
        out.push_str("\n\n");
    }

    let inputs: Vec<String> = params
        .iter()
        .filter(|(k, v)| !params::is_blank(v) && !k.ends_with("_ack"))
        .filter_map(|(k, _)| {
            let label = spec.and_then(|s| s.field(k)).map(|f| f.label)?;
            params::text(params, k).map(|text| format!("- {}: {}", label, text))
        })
        .collect();
    if !inputs.is_empty() {
        out.push_str("### Eingaben\n");
        out.push_str(&inputs.join("\n"));
        out.push_str("\n\n");
    }

    if !sources.is_empty() {
        out.push_str("### Quellen\n");
        for source in sources.iter() {
            out.push_str(&format!("- {}\n", source));
        }
    }

    out.trim_end().to_string()
}

fn push_list(out: &mut String, label: &str, items: &[String]) {
    if !items.is_empty() {
        out.push_str(&format!("- {}: {}\n", label, items.join(", ")));
    }
}
