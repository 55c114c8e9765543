// 📊 Aggregator - one summary row per country
//
// mean/min/max of per-capita kg, mean/sum of total consumption, min/max year.
// Missing values are skipped the way a dataframe groupby skips NaN.

use crate::merge::MergedRecord;
use crate::value::round_to;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SUMMARY_DECIMALS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountrySummary {
    #[serde(rename = "Country")]
    pub country: String,

    #[serde(rename = "Consumption_Per_Capita_kg_mean")]
    pub per_capita_kg_mean: Option<f64>,

    #[serde(rename = "Consumption_Per_Capita_kg_min")]
    pub per_capita_kg_min: Option<f64>,

    #[serde(rename = "Consumption_Per_Capita_kg_max")]
    pub per_capita_kg_max: Option<f64>,

    #[serde(rename = "Total_Consumption_mean")]
    pub total_consumption_mean: Option<f64>,

    #[serde(rename = "Total_Consumption_sum")]
    pub total_consumption_sum: f64,

    #[serde(rename = "Year_min")]
    pub year_min: i32,

    #[serde(rename = "Year_max")]
    pub year_max: i32,
}

/// Group records by country (ascending) and summarize each group
pub fn summarize(records: &[MergedRecord]) -> Vec<CountrySummary> {
    let mut groups: BTreeMap<&str, Vec<&MergedRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.country.as_str()).or_default().push(record);
    }

    groups
        .into_iter()
        .filter_map(|(country, group)| {
            let per_capita: Vec<f64> = group.iter().filter_map(|r| r.per_capita_kg).collect();
            let totals: Vec<f64> = group.iter().filter_map(|r| r.total_consumption).collect();
            let year_min = group.iter().map(|r| r.year).min()?;
            let year_max = group.iter().map(|r| r.year).max()?;

            Some(CountrySummary {
                country: country.to_string(),
                per_capita_kg_mean: mean(&per_capita).map(round4),
                per_capita_kg_min: min(&per_capita).map(round4),
                per_capita_kg_max: max(&per_capita).map(round4),
                total_consumption_mean: mean(&totals).map(round4),
                total_consumption_sum: round4(totals.iter().sum()),
                year_min,
                year_max,
            })
        })
        .collect()
}

/// Countries ranked by mean per-capita kg, highest first
pub fn top_by_mean_per_capita(summaries: &[CountrySummary], n: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = summaries
        .iter()
        .filter_map(|s| s.per_capita_kg_mean.map(|m| (s.country.clone(), m)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(n);
    ranked
}

fn round4(value: f64) -> f64 {
    round_to(value, SUMMARY_DECIMALS)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

// ============================================================================
// TESTS
// ============================================================================
