//! Missing-field gate and anomaly follow-ups.

use super::params::{self, Params};
use super::registry::DomainSpec;
use super::state::{Derived, Message, OpenForm, StatePatch, UiEvent};

/// Follow-up questions emitted per turn at most.
pub const MAX_FOLLOWUPS: usize = 2;

/// An anomaly flag that needs the user's confirmation before retrieval.
struct Followup {
    flag: &'static str,
    ack: &'static str,
    only_domain: Option<&'static str>,
    question: &'static str,
}

const FOLLOWUPS: &[Followup] = &[
    Followup {
        flag: "requires_pressure_stage",
        ack: "pressure_stage_ack",
        only_domain: None,
        question: "Ein Überdruck >2 bar ist für Standard-Radialdichtringe kritisch. \
                   Dürfen Druckstufenlösungen geprüft werden?",
    },
    Followup {
        flag: "speed_high",
        ack: "speed_high_ack",
        only_domain: None,
        question: "Die Drehzahl/Umfangsgeschwindigkeit ist hoch. \
                   Ist sie dauerhaft oder nur kurzzeitig (Spitzen)?",
    },
    Followup {
        flag: "temp_very_high",
        ack: "temp_very_high_ack",
        only_domain: None,
        question: "Die Temperatur ist sehr hoch. Handelt es sich um Dauer- oder Spitzentemperaturen?",
    },
    Followup {
        flag: "extrusion_risk",
        ack: "extrusion_risk_ack",
        only_domain: Some("hydraulics_rod"),
        question: "Bei dem Druck besteht Extrusionsrisiko. \
                   Darf eine Stütz-/Back-up-Ring-Lösung geprüft werden?",
    },
];

/// Result of a gate that halts the turn.
#[derive(Debug, Clone, PartialEq)]
pub struct GateHalt {
    pub message: String,
    pub missing: Vec<String>,
    pub form: OpenForm,
}

impl GateHalt {
    pub fn into_patches(self) -> Vec<StatePatch> {
        vec![
            StatePatch::MissingFields(self.missing),
            StatePatch::AppendMessage(Message::assistant(self.message)),
            StatePatch::UiEvent(UiEvent::OpenForm(self.form)),
        ]
    }
}

/// German prompt naming the missing fields in display order.
pub fn missing_prompt(spec: &DomainSpec, missing: &[String]) -> String {
    let labels: Vec<String> = spec
        .ordered(missing)
        .into_iter()
        .map(|name| format!("**{}**", spec.label(name)))
        .collect();
    format!(
        "Für eine belastbare Auslegung fehlen noch: {}.\nBitte ergänze die Werte (z. B. „{}“).",
        labels.join(", "),
        spec.example
    )
}

/// Blocking gate: halts when required fields are missing.
pub fn check_required(spec: &DomainSpec, params: &Params) -> Option<GateHalt> {
    let missing = spec.missing(params);
    if missing.is_empty() {
        return None;
    }
    Some(GateHalt {
        message: missing_prompt(spec, &missing),
        form: OpenForm::for_domain(spec.id, missing.clone(), params),
        missing,
    })
}

/// Unacknowledged anomaly questions, in priority order.
pub fn followup_questions(domain: &str, params: &Params, derived: &Derived) -> Vec<&'static str> {
    FOLLOWUPS
        .iter()
        .filter(|f| f.only_domain.map_or(true, |d| d == domain))
        .filter(|f| derived.flag(f.flag))
        .filter(|f| !(params::flag(params, f.ack) || derived.flag(f.ack)))
        .map(|f| f.question)
        .collect()
}

/// Follow-up gate: asks for confirmation of anomalies with an empty form.
pub fn check_followups(spec: &DomainSpec, params: &Params, derived: &Derived) -> Option<GateHalt> {
    let questions = followup_questions(spec.id, params, derived);
    if questions.is_empty() {
        return None;
    }
    let mut message = String::from("Bevor ich eine Empfehlung gebe, bitte kurz bestätigen:");
    for question in questions.iter().take(MAX_FOLLOWUPS) {
        message.push_str("\n- ");
        message.push_str(question);
    }
    Some(GateHalt {
        message,
        missing: Vec::new(),
        form: OpenForm::for_domain(spec.id, Vec::new(), params),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::consult::domains::{hydraulics_rod, rwdr};
    use serde_json::json;

    fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn flags(names: &[&str]) -> Derived {
        let mut d = Derived::default();
        for name in names {
            d.set_flag(name);
        }
        d
    }

    #[test]
    fn prompt_lists_labels_in_display_order() {
        let spec = rwdr::spec();
        let text = missing_prompt(&spec, &["druck_bar".into(), "wellen_mm".into()]);
        assert_eq!(
            text,
            "Für eine belastbare Auslegung fehlen noch: **Welle (mm)**, **Druck (bar)**.\n\
             Bitte ergänze die Werte (z. B. „Welle 25, Gehäuse 47, Breite 7, Medium Öl, Tmax 80, Druck 2 bar, n 1500“)."
        );
    }

    #[test]
    fn required_gate_builds_form_with_prefill() {
        let spec = rwdr::spec();
        let halt = check_required(&spec, &params(json!({"wellen_mm": 25, "medium": ""}))).unwrap();
        assert!(halt.missing.contains(&"medium".to_string()));
        assert_eq!(halt.form.missing, halt.missing);
        assert_eq!(halt.form.prefill.len(), 1);
        assert_eq!(halt.form.form_id, "rwdr_params_v1");
    }

    #[test]
    fn complete_params_pass_required_gate() {
        let spec = rwdr::spec();
        let p = params(json!({
            "wellen_mm": 25, "gehause_mm": 47, "breite_mm": 7, "medium": "Öl",
            "temp_max_c": 80, "druck_bar": 2, "drehzahl_u_min": 1500, "falltyp": "ersatz"
        }));
        assert!(check_required(&spec, &p).is_none());
    }

    #[test]
    fn followups_are_capped_at_two() {
        let spec = rwdr::spec();
        let derived = flags(&["requires_pressure_stage", "speed_high", "temp_very_high"]);
        let halt = check_followups(&spec, &Params::new(), &derived).unwrap();
        assert_eq!(halt.message.matches("\n- ").count(), 2);
        assert!(halt.missing.is_empty());
        assert!(halt.form.missing.is_empty());
    }

    #[test]
    fn acknowledged_flags_are_not_asked_again() {
        let derived = flags(&["requires_pressure_stage"]);
        let acked = params(json!({"pressure_stage_ack": true}));
        assert!(followup_questions("rwdr", &acked, &derived).is_empty());
        assert!(check_followups(&rwdr::spec(), &acked, &derived).is_none());
    }

    #[test]
    fn extrusion_risk_only_for_rod_seals() {
        let derived = flags(&["extrusion_risk"]);
        assert!(followup_questions("rwdr", &Params::new(), &derived).is_empty());
        assert_eq!(followup_questions(hydraulics_rod::ID, &Params::new(), &derived).len(), 1);
    }
}
