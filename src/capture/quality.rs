//! # Quality Evaluator
//!
//! Applies per-line data-quality rules against the current schema and
//! produces warning messages for the diagnostic log.
//!
//! Every rule fires independently: a malformed field suppresses only its own
//! rule, never an unrelated one. Lines whose field count does not match the
//! schema (beyond the appended PC-timestamp tolerance) are not attributable
//! to named columns and are skipped entirely.

use super::schema::{Schema, FIELD_DELIMITER};

/// Maximum accepted gap between filtered and reference distance (mm)
pub const DIVERGENCE_LIMIT_MM: f64 = 50.0;

/// Divergence is only suspicious early in a run, before the sled moves (s)
pub const DIVERGENCE_WINDOW_S: f64 = 0.2;

/// Maximum accepted pitch standard deviation during calibration (degrees)
pub const PITCH_STD_LIMIT_DEG: f64 = 0.5;

/// Maximum accepted sonar standard deviation during calibration (mm)
pub const SONAR_STD_LIMIT_MM: f64 = 20.0;

/// Evaluate one line against the current schema
///
/// # Arguments
///
/// * `line` - Decoded device line
/// * `schema` - Schema in effect, or `None` before any header was seen
///
/// # Returns
///
/// * `Vec<String>` - One warning message per rule that fired, possibly empty
pub fn evaluate(line: &str, schema: Option<&Schema>) -> Vec<String> {
    let mut warnings = Vec::new();
    let has_nan = line.to_lowercase().contains("nan");

    let Some(schema) = schema else {
        // No schema yet: only the coarse textual check applies
        if has_nan {
            warnings.push("Invalid measurement in line (nan)".to_string());
        }
        return warnings;
    };

    let fields: Vec<&str> = line.split(FIELD_DELIMITER).map(str::trim).collect();

    // Off-by-one tolerance for the Timestamp_PC column appended by the writer
    if fields.len().abs_diff(schema.len()) > 1 {
        return warnings;
    }

    let value_of = |name: &str| -> Option<&str> {
        schema.column_index(name).and_then(|i| fields.get(i)).copied()
    };
    let flag_is_false = |name: &str| value_of(name) == Some("0");
    let numeric = |name: &str| -> Option<f64> {
        value_of(name).and_then(|v| v.parse::<f64>().ok())
    };

    if flag_is_false("mpu_ok") {
        warnings.push("Invalid accelerometer data during run (mpu_ok=0)".to_string());
    }

    if flag_is_false("mpu_ok_slip") {
        warnings.push("Slip detected without valid MPU (mpu_ok_slip=0)".to_string());
    }

    if flag_is_false("sonar_ok") {
        warnings.push("Invalid distance sensor data (sonar_ok=0)".to_string());
    }

    if let Some(stale_ms) = numeric("sonar_stale_ms") {
        if stale_ms > 0.0 {
            warnings.push(format!(
                "Distance sensor went stale for {} ms (sonar_stale_ms)",
                stale_ms
            ));
        }
    }

    if has_nan {
        warnings.push("Invalid measurement in line (nan)".to_string());
    }

    if flag_is_false("s_ok") {
        warnings.push("Displacement inconsistent with configured target (s_ok=0)".to_string());
    }

    // Filtered vs reference distance should agree while the sled is at rest;
    // once the run is under way (tempo_s >= window) divergence is expected.
    if let (Some(filtered), Some(reference)) =
        (numeric("sonar_filtrado_mm"), numeric("dist_ref_mm"))
    {
        let early = numeric("tempo_s").map_or(true, |t| t < DIVERGENCE_WINDOW_S);
        if (filtered - reference).abs() > DIVERGENCE_LIMIT_MM && early {
            warnings.push(format!(
                "Large divergence between filtered and reference distance \
                 (sonar_filtrado_mm={}, dist_ref_mm={})",
                value_of("sonar_filtrado_mm").unwrap_or(""),
                value_of("dist_ref_mm").unwrap_or("")
            ));
        }
    }

    if let Some(pitch_std) = numeric("pitch_std_deg") {
        if pitch_std > PITCH_STD_LIMIT_DEG {
            warnings.push(format!(
                "Unstable calibration: pitch deviation {} deg (pitch_std_deg)",
                pitch_std
            ));
        }
    }

    if let Some(sonar_std) = numeric("sonar_std_mm") {
        if sonar_std > SONAR_STD_LIMIT_MM {
            warnings.push(format!(
                "Unstable calibration: sonar deviation {} mm (sonar_std_mm)",
                sonar_std
            ));
        }
    }

    warnings
}
