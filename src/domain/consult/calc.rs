//! Domain-independent physics over the accumulated parameters.
//!
//! Pure and total: malformed numbers are treated as absent and the function
//! never fails. Domain-specific rules live in [`super::domains`].

use std::f64::consts::PI;

use super::params::{first_number, number, round_to, Params};
use super::state::Derived;

/// PV limit above which the load indicator is flagged, in MPa·m/s.
const PV_WARNING_MPA_MS: f64 = 0.5;

/// Physics inputs resolved from params and their aliases.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhysicsInputs {
    pub diameter_mm: Option<f64>,
    pub rpm: Option<f64>,
    pub speed_m_s: Option<f64>,
    pub pressure_bar: Option<f64>,
    pub mu: Option<f64>,
    pub axial_force_n: Option<f64>,
    pub contact_pressure_mpa: Option<f64>,
    pub contact_width_mm: Option<f64>,
}

impl PhysicsInputs {
    pub fn from_params(params: &Params) -> Self {
        Self {
            diameter_mm: first_number(params, &["wellen_mm", "stange_mm"]),
            rpm: first_number(params, &["drehzahl_u_min", "n_u_min", "rpm"]),
            speed_m_s: first_number(
                params,
                &["relativgeschwindigkeit_ms", "geschwindigkeit_m_s", "v_ms"],
            ),
            pressure_bar: first_number(params, &["druck_bar", "pressure_bar"]),
            mu: number(params, "mu"),
            axial_force_n: number(params, "axial_force_n"),
            contact_pressure_mpa: number(params, "contact_pressure_mpa"),
            contact_width_mm: first_number(params, &["contact_width_mm", "width_mm"]),
        }
    }

    /// Explicit speed, else surface speed from diameter and rpm.
    pub fn speed(&self) -> Option<f64> {
        self.speed_m_s.or_else(|| match (self.diameter_mm, self.rpm) {
            (Some(d), Some(n)) if d > 0.0 && n > 0.0 => Some(PI * (d / 1000.0) * (n / 60.0)),
            _ => None,
        })
    }

    fn friction_force(&self) -> Option<f64> {
        let mu = self.mu?;
        if let Some(axial) = self.axial_force_n {
            return Some(mu * axial);
        }
        let d_m = self.diameter_mm? / 1000.0;
        let b_m = self.contact_width_mm? / 1000.0;
        let normal = self.contact_pressure_mpa? * 1e6 * PI * d_m * b_m;
        Some(mu * normal)
    }
}

/// Surface speed, angular velocity, pressure conversions, PV and optional
/// friction values.
pub fn physics(params: &Params) -> Derived {
    let inputs = PhysicsInputs::from_params(params);
    let v = inputs.speed();
    let mut out = Derived::default();
    let mut put = |key: &str, value: f64, places: i32| {
        out.calculated.insert(key.to_string(), round_to(value, places));
    };

    if let Some(v) = v {
        put("surface_speed_m_s", v, 6);
        put("umfangsgeschwindigkeit_m_s", v, 6);
    }
    if let Some(rpm) = inputs.rpm {
        put("omega_rad_s", 2.0 * PI * rpm / 60.0, 6);
    }

    let mut pv_mpa = None;
    if let Some(p) = inputs.pressure_bar {
        put("p_bar", p, 6);
        put("p_pa", p * 1e5, 3);
        put("p_mpa", p / 10.0, 6);
        if let Some(v) = v {
            put("pv_bar_ms", p * v, 6);
            put("pv_mpa_ms", p / 10.0 * v, 6);
            pv_mpa = Some(p / 10.0 * v);
        }
    }

    if let (Some(force), Some(v)) = (inputs.friction_force(), v) {
        put("friction_force_n", force, 6);
        put("friction_power_w", force * v, 6);
    }

    if let Some(pv) = pv_mpa.filter(|pv| *pv > PV_WARNING_MPA_MS) {
        out.pv_warning = true;
        out.warnings.push(format!(
            "PV-Kennzahl hoch ({:.3} MPa·m/s): Material/Profil prüfen.",
            pv
        ));
    }
    out.relativgeschwindigkeit_ms = v;
    out
}
