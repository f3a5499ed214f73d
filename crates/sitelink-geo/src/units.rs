//! Model-unit resolution.
//!
//! Models arrive with a free-text unit label recorded by the translation
//! pipeline (`"mm"`, `"feet"`, ...). [`resolve_scale`] maps that label to the
//! meters→model-unit multiplier the calibrator needs.

use tracing::warn;

/// Resolve a stored unit label to a meters→model-unit multiplier.
///
/// Matching is case-insensitive and ignores surrounding whitespace. An absent
/// or unrecognized label resolves to 1.0 (meters): a misconfigured unit
/// degrades to an incorrect-but-defined scale instead of blocking the ingest
/// pipeline. Unrecognized labels are logged so the operator can spot the
/// misconfiguration.
pub fn resolve_scale(label: Option<&str>) -> f64 {
    let Some(raw) = label else {
        return 1.0;
    };
    match raw.trim().to_lowercase().as_str() {
        "m" | "meter" | "meters" => 1.0,
        "mm" | "millimeter" | "millimeters" => 1000.0,
        "ft" | "foot" | "feet" => 3.28084,
        "in" | "inch" | "inches" => 39.3701,
        "cm" | "centimeter" | "centimeters" => 100.0,
        other => {
            if !other.is_empty() {
                warn!(unit = other, "unrecognized model unit, falling back to meters");
            }
            1.0
        }
    }
}
