//! Domain registry: per-domain schema, calculator and ask-order.
//!
//! Every domain is an immutable [`DomainSpec`] registered at startup. The
//! registry is the only source of truth for which fields are required and
//! how a field's value counts as "missing".

use std::sync::Arc;

use serde_json::Value;

use super::domains;
use super::params::{self, Params};
use super::state::Derived;

/// How a field value is judged present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any non-blank value.
    Text,
    /// Must parse as a number; zero and negatives are valid.
    Number,
    /// Must parse as a number strictly greater than zero.
    PositiveNumber,
}

/// One field of a domain schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Text }
    }

    pub const fn number(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Number }
    }

    pub const fn positive(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::PositiveNumber }
    }

    /// True when `value` does not satisfy this field.
    pub fn is_missing(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else { return true };
        if params::is_blank(value) {
            return true;
        }
        match self.kind {
            FieldKind::Text => false,
            FieldKind::Number => params::as_f64(value).is_none(),
            FieldKind::PositiveNumber => params::as_f64(value).map_or(true, |v| v <= 0.0),
        }
    }
}

/// Pure per-domain calculator.
pub type ComputeFn = fn(&Params) -> Derived;

/// Immutable description of a consultation domain.
#[derive(Debug, Clone)]
pub struct DomainSpec {
    pub id: &'static str,
    pub name: &'static str,
    /// Required fields in display order.
    pub required: Vec<FieldSpec>,
    /// Optional fields in display order.
    pub optional: Vec<FieldSpec>,
    pub compute: ComputeFn,
    /// Example input line shown when asking for missing values.
    pub example: &'static str,
}

impl DomainSpec {
    /// Required fields whose value is missing, in display order.
    pub fn missing(&self, params: &Params) -> Vec<String> {
        self.required
            .iter()
            .filter(|f| f.is_missing(params.get(f.name)))
            .map(|f| f.name.to_string())
            .collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .find(|f| f.name == name)
    }

    pub fn label<'a>(&'a self, name: &'a str) -> &'a str {
        self.field(name).map(|f| f.label).unwrap_or(name)
    }

    /// Display position; unknown fields sort last.
    fn order_of(&self, name: &str) -> usize {
        self.required
            .iter()
            .chain(self.optional.iter())
            .position(|f| f.name == name)
            .unwrap_or(usize::MAX)
    }

    /// Sorts field names into display order.
    pub fn ordered<'a>(&self, names: &'a [String]) -> Vec<&'a String> {
        let mut out: Vec<&String> = names.iter().collect();
        out.sort_by_key(|n| self.order_of(n));
        out
    }

    pub fn compute(&self, params: &Params) -> Derived {
        (self.compute)(params)
    }
}

/// Errors building a registry from configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    #[error("no domains enabled")]
    Empty,
}

/// Ordered set of registered domains. The first entry is the default.
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    specs: Vec<Arc<DomainSpec>>,
}

impl DomainRegistry {
    /// All built-in domains in their default order.
    pub fn builtin() -> Self {
        Self {
            specs: vec![Arc::new(domains::rwdr::spec()), Arc::new(domains::hydraulics_rod::spec())],
        }
    }

    /// Registry restricted to `enabled`, preserving the given order.
    pub fn with_enabled<S: AsRef<str>>(enabled: &[S]) -> Result<Self, RegistryError> {
        let all = Self::builtin();
        let mut specs = Vec::new();
        for id in enabled {
            let id = id.as_ref().trim().to_lowercase();
            if id.is_empty() {
                continue;
            }
            let spec = all.get(&id).ok_or_else(|| RegistryError::UnknownDomain(id.clone()))?;
            if !specs.iter().any(|s: &Arc<DomainSpec>| s.id == spec.id) {
                specs.push(spec);
            }
        }
        if specs.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self { specs })
    }

    pub fn get(&self, id: &str) -> Option<Arc<DomainSpec>> {
        let id = id.trim();
        self.specs.iter().find(|s| s.id.eq_ignore_ascii_case(id)).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// The default domain.
    pub fn first(&self) -> Arc<DomainSpec> {
        // `with_enabled` and `builtin` both guarantee at least one spec.
        Arc::clone(&self.specs[0])
    }

    /// Spec for `id`, or the default domain when unknown or absent.
    pub fn resolve(&self, id: Option<&str>) -> Arc<DomainSpec> {
        id.and_then(|id| self.get(id)).unwrap_or_else(|| self.first())
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.id).collect()
    }

    /// Required-field deficit for `(domain, params)`.
    pub fn missing(&self, domain: Option<&str>, params: &Params) -> Vec<String> {
        self.resolve(domain).missing(params)
    }
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rwdr_params() -> Params {
        json!({
            "wellen_mm": 25, "gehause_mm": 47, "breite_mm": 7, "medium": "Öl",
            "temp_max_c": 80, "druck_bar": 2, "drehzahl_u_min": 1500, "falltyp": "ersatz"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn complete_rwdr_params_have_no_deficit() {
        let registry = DomainRegistry::builtin();
        assert!(registry.missing(Some("rwdr"), &rwdr_params()).is_empty());
    }

    #[test]
    fn removing_width_reports_it() {
        let registry = DomainRegistry::builtin();
        let mut params = rwdr_params();
        params.remove("breite_mm");
        assert_eq!(registry.missing(Some("rwdr"), &params), vec!["breite_mm".to_string()]);
    }

    #[test]
    fn zero_pressure_is_valid_but_zero_diameter_is_not() {
        let registry = DomainRegistry::builtin();
        let mut params = rwdr_params();
        params.insert("druck_bar".into(), json!(0));
        params.insert("wellen_mm".into(), json!("0"));
        assert_eq!(registry.missing(Some("rwdr"), &params), vec!["wellen_mm".to_string()]);
    }

    #[test]
    fn unparsable_numbers_and_unknown_are_missing() {
        let registry = DomainRegistry::builtin();
        let mut params = rwdr_params();
        params.insert("temp_max_c".into(), json!("heiß"));
        params.insert("medium".into(), json!("unknown"));
        assert_eq!(
            registry.missing(Some("rwdr"), &params),
            vec!["medium".to_string(), "temp_max_c".to_string()]
        );
    }

    #[test]
    fn missing_is_in_display_order() {
        let registry = DomainRegistry::builtin();
        let missing = registry.missing(Some("hydraulics_rod"), &Params::new());
        assert_eq!(
            missing,
            vec![
                "falltyp", "stange_mm", "nut_d_mm", "nut_b_mm", "medium", "temp_max_c",
                "druck_bar", "geschwindigkeit_m_s"
            ]
        );
    }

    #[test]
    fn enabled_list_controls_default() {
        let registry = DomainRegistry::with_enabled(&["hydraulics_rod", "rwdr"]).unwrap();
        assert_eq!(registry.first().id, "hydraulics_rod");
        assert_eq!(registry.resolve(Some("nope")).id, "hydraulics_rod");
    }

    #[test]
    fn unknown_enabled_domain_is_rejected() {
        assert_eq!(
            DomainRegistry::with_enabled(&["rwdr", "pumps"]).unwrap_err(),
            RegistryError::UnknownDomain("pumps".into())
        );
        assert_eq!(DomainRegistry::with_enabled::<&str>(&[]).unwrap_err(), RegistryError::Empty);
    }

    #[test]
    fn labels_fall_back_to_field_name() {
        let spec = DomainRegistry::builtin().first();
        assert_eq!(spec.label("breite_mm"), "Breite (mm)");
        assert_eq!(spec.label("foo"), "foo");
    }
}
