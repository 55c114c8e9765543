// 🔄 Table Reshaper - wide (one column per period) → long observations
//
// Sources disagree on how they mark period columns: crop years like "1990/91"
// or plain numeric years. `PeriodRule` captures each convention.

use crate::config::WideSchema;
use crate::error::Result;
use crate::table::Table;
use crate::value::{classify_measurement, Measurement};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

// ============================================================================
// PERIOD RULES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodRule {
    /// Header contains the separator; year is the integer before it ("1990/91" → 1990)
    Separator(char),

    /// Header is all ASCII digits
    Numeric,

    /// Numeric header within an inclusive year range
    YearRange { from: i32, to: i32 },
}

impl PeriodRule {
    /// Year for a header, or None when the header is not a period column
    pub fn year_of(&self, header: &str) -> Option<i32> {
        let header = header.trim();
        match self {
            PeriodRule::Separator(sep) => {
                let (before, _) = header.split_once(*sep)?;
                before.trim().parse().ok()
            }
            PeriodRule::Numeric => parse_numeric_header(header),
            PeriodRule::YearRange { from, to } => {
                parse_numeric_header(header).filter(|year| (*from..=*to).contains(year))
            }
        }
    }
}

fn parse_numeric_header(header: &str) -> Option<i32> {
    if header.is_empty() || !header.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    header.parse().ok()
}

// ============================================================================
// OBSERVATIONS
// ============================================================================

/// One (country, year[, category]) value from a long table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub country: String,
    pub category: Option<String>,
    pub year: i32,
    pub value: Option<f64>,
}

impl Observation {
    pub fn new(country: &str, year: i32, value: Option<f64>) -> Self {
        Observation {
            country: country.to_string(),
            category: None,
            year,
            value,
        }
    }

    /// Builder pattern: attach a category
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReshapeReport {
    pub table: String,
    /// Period headers that became observations, in header order
    pub period_columns: Vec<String>,
    pub rows: usize,
    pub observations: usize,
    /// Non-empty cells that did not parse as a measurement
    pub unparseable_cells: usize,
    /// (country, year, category) keys seen more than once
    pub duplicate_keys: Vec<String>,
}

impl ReshapeReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} rows x {} periods → {} observations ({} unparseable, {} duplicate keys)",
            self.table,
            self.rows,
            self.period_columns.len(),
            self.observations,
            self.unparseable_cells,
            self.duplicate_keys.len()
        )
    }
}

// ============================================================================
// MELT
// ============================================================================

/// Un-pivot a wide table into observations.
///
/// Identifying columns come from the schema; every other non-period column is
/// dropped.
pub fn melt(table: &Table, schema: &WideSchema) -> Result<(Vec<Observation>, ReshapeReport)> {
    let country_idx = table.require_column(&schema.country_column)?;
    let category_idx = match &schema.category_column {
        Some(column) => Some(table.require_column(column)?),
        None => None,
    };

    let periods: Vec<(usize, i32)> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != country_idx && Some(*idx) != category_idx)
        .filter_map(|(idx, header)| schema.period_rule.year_of(header).map(|year| (idx, year)))
        .collect();

    if periods.is_empty() {
        warn!(table = %table.name, rule = ?schema.period_rule, "No period columns detected");
    }

    let mut report = ReshapeReport {
        table: table.name.clone(),
        period_columns: periods
            .iter()
            .map(|(idx, _)| table.headers[*idx].trim().to_string())
            .collect(),
        rows: table.len(),
        ..Default::default()
    };

    let mut observations = Vec::with_capacity(table.len() * periods.len());
    let mut seen = HashSet::new();

    for row in &table.rows {
        let country = table.cell(row, country_idx);
        let category = category_idx.map(|idx| table.cell(row, idx));

        for (idx, year) in &periods {
            let value = match classify_measurement(table.cell(row, *idx)) {
                Measurement::Value(v) => Some(v),
                Measurement::Missing => None,
                Measurement::Invalid => {
                    report.unparseable_cells += 1;
                    None
                }
            };

            let key = (country.to_string(), *year, category.map(|c| c.to_string()));
            if !seen.insert(key) {
                let label = match category {
                    Some(c) => format!("{} / {} / {}", country, year, c),
                    None => format!("{} / {}", country, year),
                };
                debug!(table = %table.name, key = %label, "Duplicate observation key");
                report.duplicate_keys.push(label);
            }

            let mut obs = Observation::new(country, *year, value);
            if let Some(c) = category {
                obs = obs.with_category(c);
            }
            observations.push(obs);
        }
    }

    report.observations = observations.len();
    if !report.duplicate_keys.is_empty() {
        warn!(
            table = %table.name,
            duplicates = report.duplicate_keys.len(),
            "Duplicate (country, year) keys after reshape, likely a name collision"
        );
    }

    Ok((observations, report))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(country: &str, category: Option<&str>, rule: PeriodRule) -> WideSchema {
        WideSchema {
            source: "test".to_string(),
            file: "test.csv".to_string(),
            country_column: country.to_string(),
            category_column: category.map(|c| c.to_string()),
            period_rule: rule,
        }
    }

    #[test]
    fn test_separator_rule_years() {
        let rule = PeriodRule::Separator('/');

        assert_eq!(rule.year_of("1990/91"), Some(1990));
        assert_eq!(rule.year_of("2019/20"), Some(2019));
        assert_eq!(rule.year_of("Total_domestic_consumption"), None);
        assert_eq!(rule.year_of("a/b"), None);
    }

    #[test]
    fn test_numeric_rule_years() {
        assert_eq!(PeriodRule::Numeric.year_of("1990"), Some(1990));
        assert_eq!(PeriodRule::Numeric.year_of("1990/91"), None);
        assert_eq!(PeriodRule::Numeric.year_of("Country"), None);
        assert_eq!(PeriodRule::Numeric.year_of(""), None);
        assert_eq!(PeriodRule::Numeric.year_of("-1990"), None);
    }

    #[test]
    fn test_year_range_rule() {
        let rule = PeriodRule::YearRange { from: 1990, to: 2024 };

        assert_eq!(rule.year_of("1990"), Some(1990));
        assert_eq!(rule.year_of("2024"), Some(2024));
        assert_eq!(rule.year_of("1989"), None);
        assert_eq!(rule.year_of("2025"), None);
    }

    #[test]
    fn test_melt_separator_source() {
        let table = Table::from_str_named(
            "domestic.csv",
            "Country,Coffee type,1990/91,1991/92,Total_domestic_consumption\n\
             Brazil,Arabica/Robusta,100,200,300\n",
            0,
        )
        .unwrap();

        let (obs, report) =
            melt(&table, &schema("Country", Some("Coffee type"), PeriodRule::Separator('/')))
                .unwrap();

        // "Coffee type" value contains '/', but identifying columns are never periods
        assert_eq!(report.period_columns, vec!["1990/91", "1991/92"]);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0], Observation::new("Brazil", 1990, Some(100.0)).with_category("Arabica/Robusta"));
        assert_eq!(obs[1].year, 1991);
        assert_eq!(obs[1].value, Some(200.0));
    }

    #[test]
    fn test_melt_numeric_source_drops_other_columns() {
        let table = Table::from_str_named(
            "imports.csv",
            "Country,1990,1991,Total_import_consumption\nAustria,10,,10\n",
            0,
        )
        .unwrap();

        let (obs, report) = melt(&table, &schema("Country", None, PeriodRule::Numeric)).unwrap();

        assert_eq!(report.period_columns, vec!["1990", "1991"]);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].value, Some(10.0));
        assert_eq!(obs[1].value, None);
        assert_eq!(obs[1].category, None);
        assert_eq!(report.unparseable_cells, 0);
    }

    #[test]
    fn test_every_emitted_year_follows_the_rule() {
        let table = Table::from_str_named(
            "mixed.csv",
            "Country,1990/91,1995,2000/01,notes\nPeru,1,2,3,x\n",
            0,
        )
        .unwrap();

        for rule in [PeriodRule::Separator('/'), PeriodRule::Numeric] {
            let (obs, report) = melt(&table, &schema("Country", None, rule)).unwrap();
            let expected: Vec<i32> = report
                .period_columns
                .iter()
                .map(|h| rule.year_of(h).unwrap())
                .collect();
            let years: Vec<i32> = obs.iter().map(|o| o.year).collect();
            assert_eq!(years, expected);
        }
    }

    #[test]
    fn test_melt_reports_duplicates_and_bad_cells() {
        let table = Table::from_str_named(
            "dup.csv",
            "Country,1990\nBrazil,1\nBrazil,oops\n",
            0,
        )
        .unwrap();

        let (obs, report) = melt(&table, &schema("Country", None, PeriodRule::Numeric)).unwrap();

        assert_eq!(obs.len(), 2);
        assert_eq!(report.duplicate_keys, vec!["Brazil / 1990"]);
        assert_eq!(report.unparseable_cells, 1);
    }

    #[test]
    fn test_melt_missing_country_column() {
        let table = Table::from_str_named("x.csv", "Entity,1990\nBrazil,1\n", 0).unwrap();

        assert!(melt(&table, &schema("Country", None, PeriodRule::Numeric)).is_err());
    }

    #[test]
    fn test_sentinel_cells_are_missing_not_unparseable() {
        let table = Table::from_str_named("s.csv", "Country,1990\nBrazil,-2147483648\n", 0).unwrap();

        let (obs, report) = melt(&table, &schema("Country", None, PeriodRule::Numeric)).unwrap();

        assert_eq!(obs[0].value, None);
        assert_eq!(report.unparseable_cells, 0);
    }
}
