//! Parameter aliasing, normalization, retrieval query and the post-retrieval
//! branch decision.

use serde_json::Value;

use super::params::{self, format_number, number_value, Params};
use super::state::{ConsultState, Derived};

/// Compatibility aliases written by `compute` when absent: (alias, source).
const COMPUTE_ALIASES: &[(&str, &str)] = &[
    ("tmax_c", "temp_max_c"),
    ("temp_c", "temp_max_c"),
    ("druck", "druck_bar"),
    ("pressure_bar", "druck_bar"),
    ("n_u_min", "drehzahl_u_min"),
    ("rpm", "drehzahl_u_min"),
    ("v_ms", "relativgeschwindigkeit_ms"),
];

/// Harmonization applied by `validate` when the target is blank: (alias, target).
const CANONICAL_ALIASES: &[(&str, &str)] = &[
    ("tmax_c", "temp_max_c"),
    ("pressure_bar", "druck_bar"),
    ("n_u_min", "drehzahl_u_min"),
    ("rpm", "drehzahl_u_min"),
    ("v_ms", "relativgeschwindigkeit_ms"),
];

/// Keys coerced to floats before retrieval.
const NUMERIC_KEYS: &[&str] = &[
    "temp_max_c",
    "temp_min_c",
    "druck_bar",
    "drehzahl_u_min",
    "wellen_mm",
    "gehause_mm",
    "breite_mm",
    "relativgeschwindigkeit_ms",
    "tmax_c",
    "pressure_bar",
    "n_u_min",
    "rpm",
    "v_ms",
];

/// Alias entries missing from `params`.
pub fn compute_aliases(params: &Params) -> Params {
    let mut out = Params::new();
    for (alias, source) in COMPUTE_ALIASES {
        if params.contains_key(*alias) || out.contains_key(*alias) {
            continue;
        }
        if let Some(value) = params.get(*source).filter(|v| !params::is_blank(v)) {
            out.insert(alias.to_string(), value.clone());
        }
    }
    out
}

/// Float coercion of numeric keys plus alias harmonization, as a patch.
pub fn normalize(params: &Params) -> Params {
    let mut out = Params::new();
    for key in NUMERIC_KEYS {
        if let Some(value) = params.get(*key) {
            if matches!(value, Value::String(_)) {
                if let Some(n) = params::as_f64(value) {
                    out.insert(key.to_string(), number_value(n));
                }
            }
        }
    }
    for (alias, target) in CANONICAL_ALIASES {
        let target_blank = params::is_unset(params, target) && !out.contains_key(*target);
        if !target_blank {
            continue;
        }
        let value = out.get(*alias).or_else(|| params.get(*alias)).cloned();
        if let Some(value) = value.filter(|v| !params::is_blank(v)) {
            out.insert(target.to_string(), value);
        }
    }
    out
}

fn speed(params: &Params, derived: &Derived) -> Option<f64> {
    params::first_number(params, &["relativgeschwindigkeit_ms", "geschwindigkeit_m_s", "v_ms"])
        .or(derived.relativgeschwindigkeit_ms)
        .or_else(|| derived.value("surface_speed_m_s"))
        .filter(|v| *v > 0.0)
}

/// Compact one-line summary such as
/// `RWDR, 25x47x7, Öl, Tmax 80 °C, Druck 2 bar, 1500 U/min, v≈1.96 m/s`.
pub fn summary(domain: &str, params: &Params, derived: &Derived) -> String {
    let mut parts: Vec<String> = Vec::new();
    let text = |key: &str| params::text(params, key);

    match domain {
        "rwdr" => {
            parts.push("RWDR".into());
            if let (Some(d), Some(h), Some(b)) = (text("wellen_mm"), text("gehause_mm"), text("breite_mm")) {
                parts.push(format!("{}x{}x{}", d, h, b));
            }
        }
        "hydraulics_rod" => {
            parts.push("Hydraulik Stangendichtung".into());
            if let Some(rod) = text("stange_mm") {
                parts.push(format!("Stange {} mm", rod));
            }
        }
        other if !other.is_empty() => parts.push(other.to_string()),
        _ => {}
    }

    if let Some(medium) = text("medium") {
        parts.push(medium);
    }
    if let Some(t) = params::first_number(params, &["temp_max_c", "tmax_c"]) {
        parts.push(format!("Tmax {} °C", format_number(t.trunc())));
    }
    if let Some(p) = text("druck_bar") {
        parts.push(format!("Druck {} bar", p));
    }
    if let Some(n) = params::number(params, "drehzahl_u_min") {
        parts.push(format!("{} U/min", format_number(n.trunc())));
    }
    if let Some(v) = speed(params, derived) {
        parts.push(format!("v≈{:.2} m/s", v));
    }
    if !derived.material_blacklist.is_empty() {
        parts.push(format!("Vermeide: {}", derived.material_blacklist.join("/")));
    }
    if !derived.material_whitelist.is_empty() {
        parts.push(format!("Bevorzugt: {}", derived.material_whitelist.join("/")));
    }
    parts.join(", ")
}

/// `"<user text> | <summary>"`, or whichever part is non-empty.
pub fn build_query(user_text: &str, summary: &str) -> String {
    match (user_text.trim(), summary.trim()) {
        ("", s) => s.to_string(),
        (u, "") => u.to_string(),
        (u, s) => format!("{} | {}", u, s),
    }
}

/// Post-retrieval branch: recommend only with temperature, pressure, a
/// known speed and some evidence.
pub fn should_recommend(state: &ConsultState) -> bool {
    let p = &state.params;
    let base_ok = !params::is_unset(p, "temp_max_c") && !params::is_unset(p, "druck_bar");
    let speed_ok = ["relativgeschwindigkeit_ms", "geschwindigkeit_m_s", "v_ms"]
        .iter()
        .any(|k| !params::is_unset(p, k))
        || state.derived.relativgeschwindigkeit_ms.is_some()
        || (!params::is_unset(p, "wellen_mm") && !params::is_unset(p, "drehzahl_u_min"));
    let evidence_ok = !state.retrieved_docs.is_empty() || !state.context.trim().is_empty();
    base_ok && speed_ok && evidence_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::consult::evidence::RetrievedDoc;
    use crate::domain::consult::state::StatePatch;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn compute_aliases_only_fill_absent_keys() {
        let p = params(json!({"temp_max_c": 80, "druck_bar": 2, "rpm": 900, "drehzahl_u_min": 1500}));
        let aliases = compute_aliases(&p);
        assert_eq!(aliases["tmax_c"], json!(80));
        assert_eq!(aliases["temp_c"], json!(80));
        assert_eq!(aliases["pressure_bar"], json!(2));
        assert_eq!(aliases["n_u_min"], json!(1500));
        assert!(!aliases.contains_key("rpm"));
        assert!(!aliases.contains_key("v_ms"));
    }

    #[test]
    fn normalize_coerces_and_harmonizes() {
        let p = params(json!({"temp_max_c": "80", "druck_bar": "zwei", "rpm": "1500", "medium": "Öl"}));
        let patch = normalize(&p);
        assert_eq!(patch["temp_max_c"], json!(80.0));
        assert!(!patch.contains_key("druck_bar"));
        assert_eq!(patch["drehzahl_u_min"], json!(1500.0));
        assert!(!patch.contains_key("medium"));
    }

    #[test]
    fn rwdr_summary_matches_compact_form() {
        let p = params(json!({
            "wellen_mm": 25, "gehause_mm": 47, "breite_mm": 7, "medium": "Öl",
            "temp_max_c": 80, "druck_bar": 2, "drehzahl_u_min": 1500
        }));
        let mut derived = Derived::default();
        derived.relativgeschwindigkeit_ms = Some(1.9635);
        assert_eq!(
            summary("rwdr", &p, &derived),
            "RWDR, 25x47x7, Öl, Tmax 80 °C, Druck 2 bar, 1500 U/min, v≈1.96 m/s"
        );
    }

    #[test]
    fn query_joins_user_text_and_summary() {
        assert_eq!(build_query("Welche Dichtung?", "RWDR"), "Welche Dichtung? | RWDR");
        assert_eq!(build_query("  ", "RWDR"), "RWDR");
        assert_eq!(build_query("Frage", ""), "Frage");
    }

    mod branch {
        use super::*;

        fn state() -> ConsultState {
            let mut state = ConsultState::new();
            state.apply(StatePatch::MergeParams(params(json!({
                "temp_max_c": 80, "druck_bar": 2, "wellen_mm": 25, "drehzahl_u_min": 1500
            }))));
            state
        }

        #[test]
        fn recommends_with_evidence() {
            let mut s = state();
            s.apply(StatePatch::Evidence {
                docs: vec![RetrievedDoc { text: "FKM".into(), ..RetrievedDoc::default() }],
                context: "FKM".into(),
            });
            assert!(should_recommend(&s));
        }

        #[test]
        fn explains_without_evidence() {
            assert!(!should_recommend(&state()));
        }

        #[test]
        fn explains_without_speed() {
            let mut s = ConsultState::new();
            s.apply(StatePatch::MergeParams(params(json!({"temp_max_c": 80, "druck_bar": 0}))));
            s.apply(StatePatch::Evidence { docs: vec![], context: "ctx".into() });
            assert!(!should_recommend(&s));
        }
    }
}
