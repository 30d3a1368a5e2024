//! Radial shaft seals (Radialwellendichtring).

use std::collections::BTreeSet;
use std::f64::consts::PI;

use super::{lower, num_or};
use crate::domain::consult::params::{round_to, Params};
use crate::domain::consult::registry::{DomainSpec, FieldSpec};
use crate::domain::consult::state::Derived;

pub const ID: &str = "rwdr";

const OIL_MARKERS: [&str; 4] = ["hydraulik", "öl", "oel", "oil"];
const CHEMICAL_MARKERS: [&str; 4] = ["chem", "lösemittel", "loesemittel", "solvent"];

pub fn spec() -> DomainSpec {
    DomainSpec {
        id: ID,
        name: "Radialwellendichtring",
        required: vec![
            FieldSpec::text("falltyp", "Anwendungsfall (Ersatz/Neu/Optimierung)"),
            FieldSpec::positive("wellen_mm", "Welle (mm)"),
            FieldSpec::positive("gehause_mm", "Gehäuse (mm)"),
            FieldSpec::positive("breite_mm", "Breite (mm)"),
            FieldSpec::text("medium", "Medium"),
            FieldSpec::number("temp_max_c", "Temperatur max (°C)"),
            FieldSpec::number("druck_bar", "Druck (bar)"),
            FieldSpec::positive("drehzahl_u_min", "Drehzahl (U/min)"),
        ],
        optional: vec![
            FieldSpec::text("bauform", "Bauform/Profil"),
            FieldSpec::number("temp_min_c", "Temperatur min (°C)"),
            FieldSpec::positive("geschwindigkeit_m_s", "Relativgeschwindigkeit (m/s)"),
            FieldSpec::text("umgebung", "Umgebung"),
            FieldSpec::text("prioritaet", "Priorität (z. B. Preis, Lebensdauer)"),
            FieldSpec::text("besondere_anforderungen", "Besondere Anforderungen"),
            FieldSpec::text("bekannte_probleme", "Bekannte Probleme"),
        ],
        compute,
        example: "Welle 25, Gehäuse 47, Breite 7, Medium Öl, Tmax 80, Druck 2 bar, n 1500",
    }
}

/// Surface speed, threshold flags and material guidance.
pub fn compute(params: &Params) -> Derived {
    let d_mm = num_or(params, "wellen_mm", 0.0);
    let rpm = num_or(params, "drehzahl_u_min", 0.0);
    let t_max = num_or(params, "temp_max_c", 0.0);
    let p_bar = num_or(params, "druck_bar", 0.0);
    let medium = lower(params, "medium");
    let bauform = lower(params, "bauform").to_uppercase();

    let mut out = Derived::default();

    let v = if d_mm > 0.0 && rpm > 0.0 {
        round_to(PI * (d_mm / 1000.0) * (rpm / 60.0), 3)
    } else {
        0.0
    };
    out.calculated.insert("umfangsgeschwindigkeit_m_s".into(), v);
    out.calculated.insert("surface_speed_m_s".into(), v);

    if p_bar > 2.0 {
        out.set_flag("requires_pressure_stage");
    }
    if v >= 20.0 {
        out.set_flag("speed_high");
    }
    if t_max >= 120.0 {
        out.set_flag("temp_very_high");
    }

    let mut whitelist = BTreeSet::new();
    let mut blacklist = BTreeSet::new();

    if bauform.starts_with("BA") {
        blacklist.insert("PTFE");
        if OIL_MARKERS.iter().any(|m| medium.contains(m)) {
            if t_max <= 100.0 {
                whitelist.extend(["NBR", "FKM"]);
            } else {
                whitelist.insert("FKM");
                blacklist.insert("NBR");
            }
        } else {
            whitelist.extend(["FKM", "NBR"]);
        }
    }
    if p_bar > 0.5 {
        blacklist.insert("PTFE");
    }
    if CHEMICAL_MARKERS.iter().any(|m| medium.contains(m)) || t_max > 180.0 {
        whitelist.insert("PTFE");
    }

    out.material_whitelist = whitelist.iter().map(|s| s.to_string()).collect();
    out.material_blacklist = blacklist.iter().map(|s| s.to_string()).collect();

    if !out.material_whitelist.is_empty() {
        out.requirements
            .push(format!("Bevorzuge Materialien: {}", out.material_whitelist.join(", ")));
    }
    if !out.material_blacklist.is_empty() {
        out.requirements
            .push(format!("Vermeide Materialien: {}", out.material_blacklist.join(", ")));
    }
    if out.flag("requires_pressure_stage") {
        out.requirements
            .push("Druckstufe oder drucktaugliches Profil erforderlich (>2 bar).".into());
    }
    if out.flag("speed_high") {
        out.requirements
            .push("Hohe Umfangsgeschwindigkeit (>= 20 m/s) berücksichtigen.".into());
    }

    out
}
