// 🔢 Ingestion boundary - raw cell text → Option<f64>
//
// Every numeric cell read from a source file goes through `parse_measurement`.
// Missing data becomes `None` here, so nothing downstream compares against
// placeholder literals.

/// Placeholder some sources use for "data unavailable" (i32::MIN)
pub const UNAVAILABLE_SENTINEL: f64 = -2_147_483_648.0;

/// What a raw cell holds once the placeholders are interpreted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Value(f64),
    /// Empty, NaN, or the unavailable sentinel
    Missing,
    /// Text that is not a number at all
    Invalid,
}

pub fn classify_measurement(raw: &str) -> Measurement {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Measurement::Missing;
    }

    let value: f64 = match trimmed.replace(',', "").parse() {
        Ok(v) => v,
        Err(_) => return Measurement::Invalid,
    };

    if value.is_nan() || value == UNAVAILABLE_SENTINEL {
        return Measurement::Missing;
    }
    if value.is_infinite() {
        return Measurement::Invalid;
    }

    Measurement::Value(value)
}

/// Parse a raw cell into a measurement.
///
/// Empty cells, `NaN`, unparseable text and the unavailable sentinel all map
/// to `None`.
pub fn parse_measurement(raw: &str) -> Option<f64> {
    match classify_measurement(raw) {
        Measurement::Value(v) => Some(v),
        Measurement::Missing | Measurement::Invalid => None,
    }
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

// ============================================================================
// TESTS
// ============================================================================
