// ✔️ Ranking Verifier - top exporters/importers from the totals tables
//
// Console output only; nothing is written back.

use crate::config::{RankingSource, VerifierConfig};
use crate::rank::{rank_top, valid_reading, RankedEntry};
use crate::table::Table;
use crate::value::parse_measurement;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

const UNIT: &str = "kg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub title: String,
    pub file: String,
    pub rows: usize,
    /// Rows whose total was missing, a sentinel, or not positive
    pub excluded: usize,
    pub top: Vec<RankedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub rankings: Vec<Ranking>,
}

impl RankingReport {
    /// Console rendering: one block per ranking, separated by a dashed rule
    pub fn render(&self) -> String {
        let blocks: Vec<String> = self
            .rankings
            .iter()
            .map(|ranking| {
                let mut block = format!("{}:\n", ranking.title);
                for entry in &ranking.top {
                    block.push_str(&entry.display_line(UNIT));
                    block.push('\n');
                }
                block
            })
            .collect();

        blocks.join(&format!("\n{}\n\n", "-".repeat(50)))
    }
}

/// Rank one totals table
pub fn rank_table(table: &Table, source: &RankingSource, top_n: usize) -> Result<Ranking> {
    let label_idx = table.require_column(&source.label_column)?;
    let value_idx = table.require_column(&source.value_column)?;

    let entries: Vec<(String, Option<f64>)> = table
        .rows
        .iter()
        .map(|row| {
            (
                table.cell(row, label_idx).to_string(),
                parse_measurement(table.cell(row, value_idx)),
            )
        })
        .collect();

    let excluded = entries
        .iter()
        .filter(|(_, value)| valid_reading(*value).is_none())
        .count();
    if excluded > 0 {
        warn!(file = %source.file, excluded, "Rows excluded from ranking (missing or non-positive total)");
    }

    Ok(Ranking {
        title: source.title.clone(),
        file: source.file.clone(),
        rows: entries.len(),
        excluded,
        top: rank_top(&entries, top_n),
    })
}

/// Load and rank every configured totals table in `dir`
pub fn run_verify(dir: &Path, config: &VerifierConfig) -> Result<RankingReport> {
    let run_id = Uuid::new_v4();
    info!(%run_id, dir = %dir.display(), "Verifying rankings");

    let mut rankings = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let path = dir.join(&source.file);
        let table = Table::from_path(&path, 0)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let ranking = rank_table(&table, source, config.top_n)
            .with_context(|| format!("Failed to rank {}", source.file))?;
        rankings.push(ranking);
    }

    Ok(RankingReport {
        run_id,
        generated_at: Utc::now(),
        rankings,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_rank_table_drops_sentinel() {
        let table = Table::from_str_named(
            "Coffee_export.csv",
            "Country,1990,Total_export\n\
             Brazil,1,-2147483648\n\
             Viet Nam,1,27824700000\n\
             Colombia,1,17656800000\n\
             Nowhere,1,0\n",
            0,
        )
        .unwrap();
        let source = VerifierConfig::default().sources[0].clone();

        let ranking = rank_table(&table, &source, 10).unwrap();

        assert_eq!(ranking.rows, 4);
        assert_eq!(ranking.excluded, 2);
        assert_eq!(ranking.top.len(), 2);
        assert_eq!(ranking.top[0].label, "Viet Nam");
        assert_eq!(ranking.top[1].label, "Colombia");
    }

    #[test]
    fn test_rank_table_missing_column() {
        let table = Table::from_str_named("Coffee_export.csv", "Country,Total\nBrazil,1\n", 0).unwrap();
        let source = VerifierConfig::default().sources[0].clone();

        assert!(rank_table(&table, &source, 10).is_err());
    }

    #[test]
    fn test_run_verify_and_render() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Coffee_export.csv"),
            "Country,Total_export\nBrazil,2000\nPeru,1500\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("Coffee_import.csv"),
            "Country,Total_import\nGermany,1234567\n",
        )
        .unwrap();

        let report = run_verify(dir.path(), &VerifierConfig::default()).unwrap();
        let text = report.render();

        assert_eq!(report.rankings.len(), 2);
        assert!(text.starts_with("Top 10 Coffee Exporters:\n1. Brazil: 2,000 kg\n2. Peru: 1,500 kg\n"));
        assert!(text.contains(&"-".repeat(50)));
        assert!(text.ends_with("Top 10 Coffee Importers:\n1. Germany: 1,234,567 kg\n"));
    }

    #[test]
    fn test_run_verify_missing_file() {
        let dir = tempfile::tempdir().unwrap();

        let err = run_verify(dir.path(), &VerifierConfig::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("Coffee_export.csv"));
    }
}
