// ☕ Consumption Merger - domestic + imports + population → per-capita table
//
// Pipeline:
//   1. Load and melt the three wide tables
//   2. Reconcile country labels toward the population vocabulary
//   3. Outer join consumption, left join population, substring fallback
//   4. Derive total and per-capita fields, drop rows with no consumption
//   5. Write the merged table and the per-country summary

use crate::aggregate::{summarize, CountrySummary};
use crate::config::{MergerConfig, WideSchema};
use crate::join::{join_with_population, JoinReport, JoinedRow, PopulationIndex};
use crate::names::{builtin, LabelGraph, ReconcileReport, Reconciler};
use crate::reshape::{melt, Observation, ReshapeReport};
use crate::table::Table;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

// ============================================================================
// MERGED RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    #[serde(rename = "Country")]
    pub country: String,

    #[serde(rename = "Year")]
    pub year: i32,

    #[serde(rename = "Coffee type")]
    pub coffee_type: Option<String>,

    #[serde(rename = "Population")]
    pub population: Option<f64>,

    #[serde(rename = "Domestic_Consumption")]
    pub domestic_consumption: Option<f64>,

    #[serde(rename = "Import_Consumption")]
    pub import_consumption: Option<f64>,

    #[serde(rename = "Total_Consumption")]
    pub total_consumption: Option<f64>,

    #[serde(rename = "Consumption_Per_Capita_kg")]
    pub per_capita_kg: Option<f64>,

    #[serde(rename = "Consumption_Per_Capita_g")]
    pub per_capita_g: Option<f64>,
}

impl MergedRecord {
    /// Build a record from a joined row (left = domestic, right = imports)
    pub fn from_joined(row: JoinedRow) -> Self {
        let total_consumption = total_consumption(row.left, row.right);
        let per_capita_kg = per_capita(total_consumption, row.population);

        MergedRecord {
            country: row.country,
            year: row.year,
            coffee_type: row.category,
            population: row.population,
            domestic_consumption: row.left,
            import_consumption: row.right,
            total_consumption,
            per_capita_kg,
            per_capita_g: per_capita_kg.map(|kg| kg * 1000.0),
        }
    }
}

/// domestic + imports with missing sides counted as zero; a zero sum means
/// "no data", not "no consumption"
pub fn total_consumption(domestic: Option<f64>, imports: Option<f64>) -> Option<f64> {
    let total = domestic.unwrap_or(0.0) + imports.unwrap_or(0.0);
    if total == 0.0 {
        None
    } else {
        Some(total)
    }
}

/// kg per person; None without a usable population
pub fn per_capita(total: Option<f64>, population: Option<f64>) -> Option<f64> {
    match (total, population) {
        (Some(total), Some(population)) if population != 0.0 => Some(total / population),
        _ => None,
    }
}

/// Join, derive, filter and sort in one step
pub fn build_records(
    domestic: &[Observation],
    imports: &[Observation],
    population: &PopulationIndex,
) -> (Vec<MergedRecord>, JoinReport, usize) {
    let (rows, join_report) = join_with_population(domestic, imports, population);

    let derived: Vec<MergedRecord> = rows.into_iter().map(MergedRecord::from_joined).collect();
    let before = derived.len();

    let mut records: Vec<MergedRecord> = derived
        .into_iter()
        .filter(|r| r.total_consumption.is_some())
        .collect();
    let dropped = before - records.len();

    // Stable: ties keep join order
    records.sort_by(|a, b| a.country.cmp(&b.country).then(a.year.cmp(&b.year)));

    (records, join_report, dropped)
}

// ============================================================================
// MERGE REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub reshape: Vec<ReshapeReport>,
    pub reconciliation: Vec<ReconcileReport>,
    pub join: JoinReport,
    pub rows_written: usize,
    /// Rows dropped because neither source had consumption data
    pub rows_without_consumption: usize,
    pub countries: usize,
    pub year_range: Option<(i32, i32)>,
    pub summary_rows: usize,
    pub merged_output: String,
    pub summary_output: String,
}

impl MergeReport {
    pub fn summary(&self) -> String {
        let years = match self.year_range {
            Some((min, max)) => format!("{} - {}", min, max),
            None => "n/a".to_string(),
        };
        format!(
            "{} rows, {} countries, years {}; {} rows without population",
            self.rows_written, self.countries, years, self.join.missing_population_after_repair
        )
    }
}

/// Everything the merge produced, for callers that want to show it
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub report: MergeReport,
    pub records: Vec<MergedRecord>,
    pub summaries: Vec<CountrySummary>,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Run the merger against the files in `dir`
pub fn run_merge(dir: &Path, config: &MergerConfig) -> Result<MergeOutcome> {
    run_merge_with_graph(dir, config, &builtin::merge_graph())
}

pub fn run_merge_with_graph(
    dir: &Path,
    config: &MergerConfig,
    graph: &LabelGraph,
) -> Result<MergeOutcome> {
    let run_id = Uuid::new_v4();
    info!(%run_id, dir = %dir.display(), "Starting consumption merge");

    let (mut population_obs, population_reshape) = load_long(dir, &config.population)?;
    let (mut domestic_obs, domestic_reshape) = load_long(dir, &config.domestic)?;
    let (mut import_obs, import_reshape) = load_long(dir, &config.imports)?;

    // Population spelling is the canonical vocabulary; its own pass only trims
    let target = config.population.source.as_str();
    let mut trimmer = Reconciler::new(graph, target, HashSet::new());
    let population_recon = trimmer.reconcile(target, &mut population_obs)?;

    let canonical: HashSet<String> = population_obs.iter().map(|o| o.country.clone()).collect();
    let mut reconciler = Reconciler::new(graph, target, canonical);
    let domestic_recon = reconciler
        .reconcile(&config.domestic.source, &mut domestic_obs)
        .with_context(|| format!("Failed to reconcile labels of {}", config.domestic.file))?;
    let import_recon = reconciler
        .reconcile(&config.imports.source, &mut import_obs)
        .with_context(|| format!("Failed to reconcile labels of {}", config.imports.file))?;

    for recon in [&domestic_recon, &import_recon] {
        info!(summary = %recon.summary(), "Labels reconciled");
    }

    let population = PopulationIndex::from_observations(&population_obs);
    let (records, join_report, dropped) = build_records(&domestic_obs, &import_obs, &population);
    info!(summary = %join_report.summary(), "Sources joined");

    let merged_path = dir.join(&config.merged_output);
    write_records(&merged_path, &records)
        .with_context(|| format!("Failed to write {}", merged_path.display()))?;

    let summaries = summarize(&records);
    let summary_path = dir.join(&config.summary_output);
    write_records(&summary_path, &summaries)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    let countries: BTreeSet<&str> = records.iter().map(|r| r.country.as_str()).collect();
    let year_range = records
        .iter()
        .map(|r| r.year)
        .min()
        .zip(records.iter().map(|r| r.year).max());

    let report = MergeReport {
        run_id,
        generated_at: Utc::now(),
        reshape: vec![domestic_reshape, import_reshape, population_reshape],
        reconciliation: vec![domestic_recon, import_recon, population_recon],
        join: join_report,
        rows_written: records.len(),
        rows_without_consumption: dropped,
        countries: countries.len(),
        year_range,
        summary_rows: summaries.len(),
        merged_output: config.merged_output.clone(),
        summary_output: config.summary_output.clone(),
    };
    info!(%run_id, summary = %report.summary(), "Merge complete");

    Ok(MergeOutcome {
        report,
        records,
        summaries,
    })
}

fn load_long(dir: &Path, schema: &WideSchema) -> Result<(Vec<Observation>, ReshapeReport)> {
    let path = dir.join(&schema.file);
    let table = Table::from_path(&path, 0)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let (observations, report) = melt(&table, schema)
        .with_context(|| format!("Failed to reshape {}", schema.file))?;
    info!(source = %schema.source, summary = %report.summary(), "Reshaped");
    Ok((observations, report))
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn obs(country: &str, year: i32, value: f64) -> Observation {
        Observation::new(country, year, Some(value))
    }

    #[test]
    fn test_total_is_null_only_without_data() {
        assert_eq!(total_consumption(None, None), None);
        assert_eq!(total_consumption(Some(0.0), None), None);
        assert_eq!(total_consumption(Some(5.0), Some(-5.0)), None);
        assert_eq!(total_consumption(Some(100.0), None), Some(100.0));
        assert_eq!(total_consumption(None, Some(2.5)), Some(2.5));
        assert_eq!(total_consumption(Some(1.0), Some(2.0)), Some(3.0));
    }

    #[test]
    fn test_per_capita_guards() {
        assert_eq!(per_capita(Some(100.0), Some(1000.0)), Some(0.1));
        assert_eq!(per_capita(Some(100.0), Some(0.0)), None);
        assert_eq!(per_capita(Some(100.0), None), None);
        assert_eq!(per_capita(None, Some(1000.0)), None);
    }

    #[test]
    fn test_brazil_domestic_only_scenario() {
        let domestic = vec![obs("Brazil", 1990, 100.0)];
        let population = PopulationIndex::from_observations(&[obs("Brazil", 1990, 1000.0)]);

        let (records, _, dropped) = build_records(&domestic, &[], &population);

        assert_eq!(dropped, 0);
        assert_eq!(records.len(), 1);
        let brazil = &records[0];
        assert_eq!(brazil.total_consumption, Some(100.0));
        assert_eq!(brazil.import_consumption, None);
        assert!((brazil.per_capita_kg.unwrap() - 0.1).abs() < 1e-12);
        assert!((brazil.per_capita_g.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_derived_fields_hold_for_every_record() {
        let domestic = vec![
            obs("Brazil", 1990, 100.0),
            obs("Brazil", 1991, 0.0),
            Observation::new("Peru", 1990, None),
            obs("Kenya", 1990, 3.0),
        ];
        let imports = vec![obs("Brazil", 1991, 0.0), obs("Peru", 1990, 7.0)];
        let population = PopulationIndex::from_observations(&[
            obs("Brazil", 1990, 1000.0),
            obs("Peru", 1990, 70.0),
            obs("Kenya", 1990, 0.0),
        ]);

        let (records, _, dropped) = build_records(&domestic, &imports, &population);

        // Brazil 1991 sums to zero → no consumption signal
        assert_eq!(dropped, 1);
        for r in &records {
            let expected_total = total_consumption(r.domestic_consumption, r.import_consumption);
            assert_eq!(r.total_consumption, expected_total);
            assert!(r.total_consumption.is_some());

            match (r.total_consumption, r.population) {
                (Some(t), Some(p)) if p > 0.0 => {
                    let kg = r.per_capita_kg.unwrap();
                    assert!((kg - t / p).abs() < 1e-12);
                    assert!((r.per_capita_g.unwrap() - kg * 1000.0).abs() < 1e-9);
                }
                _ => assert_eq!(r.per_capita_kg, None),
            }
        }
    }

    #[test]
    fn test_records_sorted_by_country_then_year() {
        let domestic = vec![
            obs("Peru", 1991, 1.0),
            obs("Brazil", 1992, 1.0),
            obs("Peru", 1990, 1.0),
        ];
        let imports = vec![obs("Austria", 1995, 1.0)];

        let (records, _, _) = build_records(&domestic, &imports, &PopulationIndex::default());
        let keys: Vec<(&str, i32)> = records.iter().map(|r| (r.country.as_str(), r.year)).collect();

        assert_eq!(
            keys,
            vec![("Austria", 1995), ("Brazil", 1992), ("Peru", 1990), ("Peru", 1991)]
        );
    }

    fn write_fixture(dir: &Path) {
        fs::write(
            dir.join("Coffee_domestic_consumption.csv"),
            "Country,Coffee type,1990/91,1991/92,Total_domestic_consumption\n\
             Brazil,Arabica/Robusta,100,200,300\n\
             Dem. Rep. Congo,Robusta,10,,10\n\
             Lao PDR,Robusta,4,6,10\n",
        )
        .unwrap();
        fs::write(
            dir.join("Coffee_importers_consumption.csv"),
            "Country,1990,1991,Total_import_consumption\n\
             Austria ,50,60,110\n\
             Brazil,0,0,0\n",
        )
        .unwrap();
        fs::write(
            dir.join("country_pop.csv"),
            "Country Name,Country Code,1989,1990,1991\n\
             Brazil,BRA,1,1000,2000\n\
             \"Congo, Dem. Rep.\",COD,1,100,110\n\
             Austria,AUT,1,500,600\n\
             Lao PDR (Lao People's Democratic Republic),LAO,1,40,60\n",
        )
        .unwrap();
    }

    #[test]
    fn test_run_merge_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let outcome = run_merge(dir.path(), &MergerConfig::default()).unwrap();
        let report = &outcome.report;

        // Brazil 2, Congo 1 (1991 missing), Lao 2, Austria 2
        assert_eq!(report.rows_written, 7);
        assert_eq!(report.countries, 4);
        assert_eq!(report.year_range, Some((1990, 1991)));
        assert_eq!(report.summary_rows, 4);
        assert_eq!(report.rows_without_consumption, 1);

        let congo: Vec<&MergedRecord> = outcome
            .records
            .iter()
            .filter(|r| r.country == "Congo, Dem. Rep.")
            .collect();
        assert_eq!(congo.len(), 1);
        assert_eq!(congo[0].population, Some(100.0));
        assert_eq!(congo[0].coffee_type.as_deref(), Some("Robusta"));

        // Fallback fired for Lao PDR and filled both years
        let lao: Vec<&MergedRecord> = outcome.records.iter().filter(|r| r.country == "Lao PDR").collect();
        assert_eq!(lao.len(), 2);
        assert!(lao.iter().all(|r| r.population.is_some()));
        assert_eq!(report.join.repairs.len(), 1);
        assert_eq!(report.join.missing_population_after_repair, 0);

        // Importer label was trimmed before the join
        assert!(outcome.records.iter().any(|r| r.country == "Austria" && r.population == Some(500.0)));

        let merged = Table::from_path(&dir.path().join("Coffee_consumption_per_capita.csv"), 0).unwrap();
        assert_eq!(
            merged.headers,
            vec![
                "Country",
                "Year",
                "Coffee type",
                "Population",
                "Domestic_Consumption",
                "Import_Consumption",
                "Total_Consumption",
                "Consumption_Per_Capita_kg",
                "Consumption_Per_Capita_g"
            ]
        );
        assert_eq!(merged.len(), 7);

        let summary = Table::from_path(&dir.path().join("Coffee_consumption_summary.csv"), 0).unwrap();
        assert_eq!(summary.len(), 4);
        assert_eq!(summary.headers[0], "Country");
    }

    #[test]
    fn test_run_merge_missing_input_fails_with_context() {
        let dir = tempfile::tempdir().unwrap();

        let err = run_merge(dir.path(), &MergerConfig::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("country_pop.csv"));
    }

    #[test]
    fn test_unmatched_labels_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        fs::write(
            dir.path().join("Coffee_importers_consumption.csv"),
            "Country,1990\nAtlantis,5\n",
        )
        .unwrap();

        let outcome = run_merge(dir.path(), &MergerConfig::default()).unwrap();
        let importers = &outcome.report.reconciliation[1];

        assert_eq!(importers.unmatched.len(), 1);
        assert_eq!(importers.unmatched[0].label, "Atlantis");
        assert!(outcome
            .report
            .join
            .missing_population_sample
            .contains(&"Atlantis".to_string()));
    }
}
