// 🏷️ Name Standardizer - rewrite every CSV's country column in place
//
// For each *.csv in a directory (except the reference file):
//   1. Skip the metadata preamble of bulk-export files
//   2. Find the country column (declared schema first, heuristics second)
//   3. Map every value through the rename map (unknown names pass through)
//   4. Overwrite the file
// A failing file is recorded and the batch moves on.

use crate::config::StandardizerConfig;
use crate::names::{builtin, RenameMap};
use crate::table::Table;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// REPORT TYPES
// ============================================================================

/// How the country column was found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detection {
    /// Declared for files with this name prefix
    Schema { file_prefix: String },
    /// First match from the candidate header list
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameChange {
    pub original: String,
    pub replacement: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Standardized {
        file: String,
        column: String,
        detection: Detection,
        changes: Vec<NameChange>,
        /// Labels still absent from the reference list after renaming
        non_canonical: Vec<String>,
    },
    Skipped {
        file: String,
        reason: String,
    },
    Failed {
        file: String,
        error: String,
    },
}

impl FileOutcome {
    pub fn file(&self) -> &str {
        match self {
            FileOutcome::Standardized { file, .. }
            | FileOutcome::Skipped { file, .. }
            | FileOutcome::Failed { file, .. } => file,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardizeReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub reference_file: String,
    /// False when the reference list could not be loaded
    pub canonical_check: bool,
    pub files: Vec<FileOutcome>,
}

impl StandardizeReport {
    pub fn standardized_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Standardized { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Failed { .. }))
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} files: {} standardized, {} skipped, {} failed",
            self.files.len(),
            self.standardized_count(),
            self.skipped_count(),
            self.failed_count()
        )
    }
}

// ============================================================================
// STANDARDIZER
// ============================================================================

pub struct Standardizer<'a> {
    config: &'a StandardizerConfig,
    map: &'a RenameMap,
    canonical: Option<HashSet<String>>,
}

impl<'a> Standardizer<'a> {
    pub fn new(config: &'a StandardizerConfig, map: &'a RenameMap) -> Self {
        Standardizer {
            config,
            map,
            canonical: None,
        }
    }

    /// Builder pattern: labels the reference file considers canonical
    pub fn with_canonical(mut self, canonical: HashSet<String>) -> Self {
        self.canonical = Some(canonical);
        self
    }

    /// Rows to skip before the header for a given file name
    pub fn skip_rows(&self, file_name: &str) -> usize {
        if file_name.starts_with(&self.config.bulk_export_prefix) {
            self.config.bulk_export_skip_rows
        } else {
            0
        }
    }

    /// Country column for a table: declared schema first, then candidates in order
    pub fn detect_country_column(&self, file_name: &str, table: &Table) -> Option<(String, Detection)> {
        for schema in &self.config.schemas {
            if file_name.starts_with(&schema.file_prefix) && table.has_column(&schema.country_column) {
                return Some((
                    schema.country_column.clone(),
                    Detection::Schema {
                        file_prefix: schema.file_prefix.clone(),
                    },
                ));
            }
        }

        self.config
            .candidate_columns
            .iter()
            .find(|c| table.has_column(c))
            .map(|c| (c.clone(), Detection::Heuristic))
    }

    /// Rename every value of `column` in place; returns one change per
    /// distinct value that was renamed
    pub fn standardize_table(&self, table: &mut Table, column: usize) -> Vec<NameChange> {
        let mut changes: BTreeMap<String, NameChange> = BTreeMap::new();

        for row in table.rows.iter_mut() {
            let Some(cell) = row.get_mut(column) else {
                continue;
            };
            let replacement = self.map.apply(cell);
            if replacement == cell.as_str() {
                continue;
            }

            let replacement = replacement.to_string();
            changes
                .entry(cell.clone())
                .or_insert_with(|| NameChange {
                    original: cell.clone(),
                    replacement: replacement.clone(),
                    rows: 0,
                })
                .rows += 1;
            *cell = replacement;
        }

        changes.into_values().collect()
    }

    /// Standardize one file, overwriting it
    pub fn standardize_file(&self, path: &Path) -> Result<FileOutcome> {
        let file_name = file_name_of(path);

        let mut table = Table::from_path(path, self.skip_rows(&file_name))
            .with_context(|| format!("Failed to read {}", file_name))?;

        let (column, detection) = match self.detect_country_column(&file_name, &table) {
            Some(found) => found,
            None => {
                info!(file = %file_name, "No country column found, skipping");
                return Ok(FileOutcome::Skipped {
                    file: file_name,
                    reason: "no country column".to_string(),
                });
            }
        };
        debug!(file = %file_name, column = %column, detection = ?detection, "Country column detected");

        let index = table.require_column(&column)?;
        let changes = self.standardize_table(&mut table, index);

        if !changes.is_empty() {
            info!(file = %file_name, "Changed country names");
            for change in &changes {
                info!(file = %file_name, "  {} -> {}", change.original, change.replacement);
            }
        }

        table
            .write_to(path)
            .with_context(|| format!("Failed to write {}", file_name))?;
        info!(file = %file_name, "Saved standardized names");

        let non_canonical = self.non_canonical_labels(&table, index);
        for label in &non_canonical {
            warn!(file = %file_name, label = %label, "Label not in reference list");
        }

        Ok(FileOutcome::Standardized {
            file: file_name,
            column,
            detection,
            changes,
            non_canonical,
        })
    }

    fn non_canonical_labels(&self, table: &Table, column: usize) -> Vec<String> {
        let Some(canonical) = &self.canonical else {
            return Vec::new();
        };

        let labels: BTreeSet<&str> = table
            .rows
            .iter()
            .map(|row| table.cell(row, column))
            .filter(|label| !label.is_empty() && !canonical.contains(*label))
            .collect();
        labels.into_iter().map(|l| l.to_string()).collect()
    }

    /// Standardize every CSV in `dir` except the reference file
    pub fn run(&self, dir: &Path) -> Result<StandardizeReport> {
        let run_id = Uuid::new_v4();
        info!(%run_id, dir = %dir.display(), "Standardizing country names");

        let mut files = Vec::new();
        for path in csv_files(dir, &self.config.reference_file)? {
            let file_name = file_name_of(&path);
            info!(file = %file_name, "Processing");

            let outcome = match self.standardize_file(&path) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(file = %file_name, error = %format!("{:#}", e), "Error processing file");
                    FileOutcome::Failed {
                        file: file_name,
                        error: format!("{:#}", e),
                    }
                }
            };
            files.push(outcome);
        }

        let report = StandardizeReport {
            run_id,
            generated_at: Utc::now(),
            reference_file: self.config.reference_file.clone(),
            canonical_check: self.canonical.is_some(),
            files,
        };
        info!(%run_id, summary = %report.summary(), "Country name standardization completed");
        Ok(report)
    }
}

// ============================================================================
// PIPELINE ENTRY
// ============================================================================

/// Load the reference list (if any) and standardize `dir`
pub fn run_standardize(
    dir: &Path,
    config: &StandardizerConfig,
    map: &RenameMap,
) -> Result<StandardizeReport> {
    for identity in map.identity_entries() {
        debug!(map = %map.name, label = identity, "Identity rename entry");
    }

    let mut standardizer = Standardizer::new(config, map);
    match load_reference(dir, config) {
        Ok(canonical) => standardizer = standardizer.with_canonical(canonical),
        Err(e) => warn!(
            file = %config.reference_file,
            error = %format!("{:#}", e),
            "Reference list unavailable, skipping canonical check"
        ),
    }

    standardizer.run(dir)
}

/// Built-in dictionary, with `extra_rename_file` entries layered on top
pub fn rename_map(config: &StandardizerConfig) -> Result<RenameMap> {
    let mut map = builtin::standardizer();
    if let Some(path) = &config.extra_rename_file {
        let extra = RenameMap::from_file(path, "extra", builtin::MIXED, builtin::REFERENCE)
            .with_context(|| format!("Failed to load rename file {}", path.display()))?;
        info!(entries = extra.len(), file = %path.display(), "Loaded extra rename entries");
        map.extend(&extra);
    }

    let chained = map.chained_keys();
    if !chained.is_empty() {
        warn!(map = %map.name, ?chained, "Rename targets are themselves renamed; a second run would change them");
    }
    Ok(map)
}

/// Canonical labels from the reference file's country column
pub fn load_reference(dir: &Path, config: &StandardizerConfig) -> Result<HashSet<String>> {
    let path = dir.join(&config.reference_file);
    let table = Table::from_path(&path, 0)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let labels = table.column_values(&config.reference_column)?;
    Ok(labels.into_iter().map(|l| l.to_string()).collect())
}

/// `*.csv` files in `dir`, sorted, excluding `reference`
fn csv_files(dir: &Path, reference: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = file_name_of(&path);
        if name.ends_with(".csv") && name != reference {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================
