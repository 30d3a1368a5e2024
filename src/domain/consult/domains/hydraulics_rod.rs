//! Hydraulic rod seals (Stangendichtung).

use crate::domain::consult::params::{self, Params};
use crate::domain::consult::registry::{DomainSpec, FieldSpec};
use crate::domain::consult::state::Derived;

pub const ID: &str = "hydraulics_rod";

const EXTRUSION_PRESSURE_BAR: f64 = 160.0;

pub fn spec() -> DomainSpec {
    DomainSpec {
        id: ID,
        name: "Hydraulik-Stangendichtung",
        required: vec![
            FieldSpec::text("falltyp", "Anwendungsfall (Ersatz/Neu/Optimierung)"),
            FieldSpec::positive("stange_mm", "Stange (mm)"),
            FieldSpec::positive("nut_d_mm", "Nut-Ø D (mm)"),
            FieldSpec::positive("nut_b_mm", "Nutbreite B (mm)"),
            FieldSpec::text("medium", "Medium"),
            FieldSpec::number("temp_max_c", "Temperatur max (°C)"),
            FieldSpec::number("druck_bar", "Druck (bar)"),
            FieldSpec::positive("geschwindigkeit_m_s", "Relativgeschwindigkeit (m/s)"),
        ],
        optional: vec![
            FieldSpec::number("temp_min_c", "Temperatur min (°C)"),
            FieldSpec::text("profil", "Profil/Bauform"),
            FieldSpec::text("werkstoff_pref", "Werkstoffpräferenz"),
            FieldSpec::text("normen", "Normen/Vorgaben"),
            FieldSpec::text("umgebung", "Umgebung"),
            FieldSpec::text("prioritaet", "Priorität (z. B. Preis, Lebensdauer)"),
            FieldSpec::text("besondere_anforderungen", "Besondere Anforderungen"),
            FieldSpec::text("bekannte_probleme", "Bekannte Probleme"),
        ],
        compute,
        example: "Stange 25, Nut D 32, Nut B 6, Medium Öl, Tmax 80, Druck 160 bar, v 0,3 m/s",
    }
}

pub fn compute(params: &Params) -> Derived {
    let p_bar = params::number(params, "druck_bar");
    let t_max = params::number(params, "temp_max_c");
    let speed = params::number(params, "geschwindigkeit_m_s");
    let bore = params::number(params, "nut_d_mm");
    let rod = params::number(params, "stange_mm");

    let mut out = Derived::default();

    if let Some(p) = p_bar {
        if p >= EXTRUSION_PRESSURE_BAR {
            out.set_flag("extrusion_risk");
            out.requirements.push("Stütz-/Back-up-Ring prüfen (≥160 bar).".into());
        }
    }
    if let Some(t) = t_max.filter(|t| *t > 100.0) {
        out.warnings
            .push(format!("Hohe Temperatur ({:.0} °C): Werkstoffwahl prüfen.", t));
        out.material_whitelist.push("FKM".into());
    }
    if let Some(v) = speed.filter(|v| *v > 0.6) {
        out.warnings.push(format!(
            "Hohe Stangengeschwindigkeit ({:.2} m/s): Reibung/Stick-Slip beachten.",
            v
        ));
    }
    if let (Some(bore), Some(rod)) = (bore, rod) {
        if bore > 0.0 && rod > 0.0 && bore - rod < 2.0 {
            out.warnings
                .push("Sehr kleiner Spalt zwischen Bohrung und Stange (< 2 mm).".into());
        }
    }

    for (key, value) in [
        ("druck_bar", p_bar),
        ("temp_max_c", t_max),
        ("geschwindigkeit_m_s", speed),
        ("bohrung_mm", bore),
        ("stange_mm", rod),
    ] {
        if let Some(value) = value {
            out.calculated.insert(key.into(), value);
        }
    }
    if let (Some(p), Some(v)) = (p_bar, speed) {
        out.calculated.insert("pv_indicator_bar_ms".into(), p * v);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn extrusion_risk_from_160_bar() {
        let derived = compute(&params(json!({"druck_bar": 160})));
        assert!(derived.flag("extrusion_risk"));
        assert_eq!(derived.requirements, vec!["Stütz-/Back-up-Ring prüfen (≥160 bar).".to_string()]);

        let derived = compute(&params(json!({"druck_bar": 159.9})));
        assert!(!derived.flag("extrusion_risk"));
    }

    #[test]
    fn warnings_for_heat_speed_and_gap() {
        let derived = compute(&params(json!({
            "temp_max_c": 120, "geschwindigkeit_m_s": "0,8", "nut_d_mm": 26, "stange_mm": 25
        })));
        assert_eq!(derived.warnings.len(), 3);
        assert!(derived.warnings[0].contains("120 °C"));
        assert!(derived.warnings[1].contains("0.80 m/s"));
    }

    #[test]
    fn pv_indicator_requires_pressure_and_speed() {
        let derived = compute(&params(json!({"druck_bar": 100, "geschwindigkeit_m_s": 0.3})));
        assert!((derived.value("pv_indicator_bar_ms").unwrap() - 30.0).abs() < 1e-9);
        assert!(compute(&params(json!({"druck_bar": 100}))).value("pv_indicator_bar_ms").is_none());
    }
}
