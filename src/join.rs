// 🔗 Multi-Source Joiner - outer join of consumption, left join of population
//
// Step 1: outer join on (country, year); a row exists if either side has it.
// Step 2: left join population; enrichment never drops a consumption row.
// Repair: countries whose label never reached the population vocabulary get a
// case-insensitive substring lookup, applied to every year of that country.

use crate::reshape::Observation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Labels shorter than this never take part in substring matching
const MIN_FALLBACK_LABEL_LEN: usize = 4;

/// How many unmatched labels a report keeps as a sample
const MISSING_SAMPLE_SIZE: usize = 10;

// ============================================================================
// JOINED ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub country: String,
    pub year: i32,
    pub category: Option<String>,
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub population: Option<f64>,
}

// ============================================================================
// STEP 1: OUTER JOIN
// ============================================================================

/// Outer join on (country, year).
///
/// Left rows come first in their original order, each paired with every
/// matching right row; right rows that matched nothing follow. Category is
/// taken from whichever side carries one.
pub fn outer_join(left: &[Observation], right: &[Observation]) -> Vec<JoinedRow> {
    let mut right_index: HashMap<(&str, i32), Vec<usize>> = HashMap::new();
    for (idx, obs) in right.iter().enumerate() {
        right_index
            .entry((obs.country.as_str(), obs.year))
            .or_default()
            .push(idx);
    }

    let mut right_matched = vec![false; right.len()];
    let mut rows = Vec::with_capacity(left.len().max(right.len()));

    for l in left {
        match right_index.get(&(l.country.as_str(), l.year)) {
            Some(matches) => {
                for &idx in matches {
                    right_matched[idx] = true;
                    let r = &right[idx];
                    rows.push(JoinedRow {
                        country: l.country.clone(),
                        year: l.year,
                        category: l.category.clone().or_else(|| r.category.clone()),
                        left: l.value,
                        right: r.value,
                        population: None,
                    });
                }
            }
            None => rows.push(JoinedRow {
                country: l.country.clone(),
                year: l.year,
                category: l.category.clone(),
                left: l.value,
                right: None,
                population: None,
            }),
        }
    }

    for (r, matched) in right.iter().zip(&right_matched) {
        if !matched {
            rows.push(JoinedRow {
                country: r.country.clone(),
                year: r.year,
                category: r.category.clone(),
                left: None,
                right: r.value,
                population: None,
            });
        }
    }

    rows
}

// ============================================================================
// STEP 2: POPULATION LOOKUP
// ============================================================================

/// Population observations indexed by (country, year)
#[derive(Debug, Clone, Default)]
pub struct PopulationIndex {
    by_key: HashMap<(String, i32), Option<f64>>,
    labels: BTreeSet<String>,
}

/// Result of a substring lookup for one country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackMatch {
    pub matched_label: String,
    /// Every label that qualified, best first
    pub candidates: Vec<String>,
}

impl PopulationIndex {
    /// First observation wins on duplicate keys (the reshaper reports them)
    pub fn from_observations(observations: &[Observation]) -> Self {
        let mut index = PopulationIndex::default();
        for obs in observations {
            index.labels.insert(obs.country.clone());
            index
                .by_key
                .entry((obs.country.clone(), obs.year))
                .or_insert(obs.value);
        }
        index
    }

    pub fn get(&self, country: &str, year: i32) -> Option<f64> {
        self.by_key
            .get(&(country.to_string(), year))
            .copied()
            .flatten()
    }

    pub fn contains_label(&self, country: &str) -> bool {
        self.labels.contains(country)
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// Case-insensitive lookup: a label equal to the country ignoring case,
    /// else a label containing the country or contained by it. An exact match
    /// wins, then the shortest label, then alphabetical order.
    pub fn find_fallback(&self, country: &str) -> Option<FallbackMatch> {
        let needle = country.trim().to_lowercase();
        if needle.chars().count() < MIN_FALLBACK_LABEL_LEN {
            return None;
        }

        let mut candidates: Vec<(bool, &String)> = self
            .labels
            .iter()
            .filter(|label| label.chars().count() >= MIN_FALLBACK_LABEL_LEN)
            .filter_map(|label| {
                let hay = label.to_lowercase();
                if hay == needle {
                    Some((true, label))
                } else if hay.contains(&needle) || needle.contains(&hay) {
                    Some((false, label))
                } else {
                    None
                }
            })
            .collect();

        candidates.sort_by(|(a_exact, a), (b_exact, b)| {
            b_exact
                .cmp(a_exact)
                .then(a.chars().count().cmp(&b.chars().count()))
                .then(a.cmp(b))
        });
        let candidates: Vec<&String> = candidates.into_iter().map(|(_, label)| label).collect();

        let best = candidates.first()?;
        Some(FallbackMatch {
            matched_label: best.to_string(),
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        })
    }
}

/// Fill `population` from an exact (country, year) lookup
pub fn attach_population(rows: &mut [JoinedRow], population: &PopulationIndex) {
    for row in rows.iter_mut() {
        row.population = population.get(&row.country, row.year);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRepair {
    pub country: String,
    pub matched_label: String,
    pub candidates: Vec<String>,
    pub rows_filled: usize,
}

/// Backfill population for countries whose label is absent from the
/// population table, using the substring lookup.
pub fn repair_missing_population(
    rows: &mut [JoinedRow],
    population: &PopulationIndex,
) -> Vec<FallbackRepair> {
    let unresolved: BTreeSet<String> = rows
        .iter()
        .filter(|r| r.population.is_none() && !population.contains_label(&r.country))
        .map(|r| r.country.clone())
        .collect();

    let mut repairs = Vec::new();

    for country in unresolved {
        let fallback = match population.find_fallback(&country) {
            Some(f) => f,
            None => continue,
        };

        let mut rows_filled = 0;
        for row in rows.iter_mut().filter(|r| r.country == country) {
            if row.population.is_none() {
                row.population = population.get(&fallback.matched_label, row.year);
                if row.population.is_some() {
                    rows_filled += 1;
                }
            }
        }

        if fallback.candidates.len() > 1 {
            warn!(
                country = %country,
                chosen = %fallback.matched_label,
                candidates = ?fallback.candidates,
                "Ambiguous population fallback, shortest label chosen"
            );
        }
        info!(
            country = %country,
            matched = %fallback.matched_label,
            rows_filled,
            "Population backfilled via substring match"
        );

        repairs.push(FallbackRepair {
            country,
            matched_label: fallback.matched_label,
            candidates: fallback.candidates,
            rows_filled,
        });
    }

    repairs
}

// ============================================================================
// JOIN REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinReport {
    pub outer_rows: usize,
    pub matched_both: usize,
    pub left_only: usize,
    pub right_only: usize,
    pub missing_population_before_repair: usize,
    pub missing_population_after_repair: usize,
    /// Up to 10 country labels that still lack population
    pub missing_population_sample: Vec<String>,
    pub repairs: Vec<FallbackRepair>,
}

impl JoinReport {
    pub fn summary(&self) -> String {
        format!(
            "{} joined rows ({} both, {} left only, {} right only); missing population {} → {} after {} repairs",
            self.outer_rows,
            self.matched_both,
            self.left_only,
            self.right_only,
            self.missing_population_before_repair,
            self.missing_population_after_repair,
            self.repairs.len()
        )
    }
}

/// Outer join + population left join + fallback repair, with diagnostics
pub fn join_with_population(
    left: &[Observation],
    right: &[Observation],
    population: &PopulationIndex,
) -> (Vec<JoinedRow>, JoinReport) {
    let mut rows = outer_join(left, right);

    let mut report = JoinReport {
        outer_rows: rows.len(),
        ..Default::default()
    };

    // Presence is about the row existing on a side, not about its value
    let left_keys: BTreeSet<(&str, i32)> = left.iter().map(|o| (o.country.as_str(), o.year)).collect();
    let right_keys: BTreeSet<(&str, i32)> = right.iter().map(|o| (o.country.as_str(), o.year)).collect();
    for row in &rows {
        let key = (row.country.as_str(), row.year);
        match (left_keys.contains(&key), right_keys.contains(&key)) {
            (true, true) => report.matched_both += 1,
            (true, false) => report.left_only += 1,
            _ => report.right_only += 1,
        }
    }

    attach_population(&mut rows, population);
    report.missing_population_before_repair = rows.iter().filter(|r| r.population.is_none()).count();

    report.repairs = repair_missing_population(&mut rows, population);

    let mut missing: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.population.is_none()) {
        *missing.entry(row.country.as_str()).or_default() += 1;
    }
    report.missing_population_after_repair = missing.values().sum();
    report.missing_population_sample = missing
        .keys()
        .take(MISSING_SAMPLE_SIZE)
        .map(|c| c.to_string())
        .collect();

    if report.missing_population_after_repair > 0 {
        warn!(
            rows = report.missing_population_after_repair,
            countries = missing.len(),
            sample = ?report.missing_population_sample,
            "Rows without population after join"
        );
    }
    debug!(summary = %report.summary(), "Join complete");

    (rows, report)
}

// ============================================================================
// TESTS
// ============================================================================
