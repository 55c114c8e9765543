// 🏆 Ranking - top-N by value, invalid readings excluded

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub label: String,
    pub value: f64,
}

impl RankedEntry {
    /// "1. Brazil: 2,595,000 kg"
    pub fn display_line(&self, unit: &str) -> String {
        format!("{}. {}: {} {}", self.rank, self.label, format_thousands(self.value), unit)
    }
}

/// A value counts for ranking only when present and strictly positive
pub fn valid_reading(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// Top `n` entries by value, descending.
///
/// Missing and non-positive values are excluded. The sort is stable, so equal
/// values keep their input order.
pub fn rank_top(entries: &[(String, Option<f64>)], n: usize) -> Vec<RankedEntry> {
    let mut valid: Vec<(&str, f64)> = entries
        .iter()
        .filter_map(|(label, value)| valid_reading(*value).map(|v| (label.as_str(), v)))
        .collect();

    valid.sort_by(|a, b| b.1.total_cmp(&a.1));

    valid
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(idx, (label, value))| RankedEntry {
            rank: idx + 1,
            label: label.to_string(),
            value,
        })
        .collect()
}

/// Round to an integer (ties to even) and group thousands with commas:
/// 1234567.4 → "1,234,567", 2.5 → "2"
pub fn format_thousands(value: f64) -> String {
    let rounded = value.round_ties_even();
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

// ============================================================================
// TESTS
// ============================================================================
