//! Built-in consultation domains.

pub mod hydraulics_rod;
pub mod rwdr;

use super::params::{self, Params};

/// Numeric reading with a default for absent or malformed input.
pub(crate) fn num_or(params: &Params, key: &str, default: f64) -> f64 {
    params::number(params, key).unwrap_or(default)
}

/// Lower-cased string value, empty when absent.
pub(crate) fn lower(params: &Params, key: &str) -> String {
    params::text(params, key).unwrap_or_default().to_lowercase()
}
