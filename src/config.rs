// ⚙️ Pipeline configuration - every literal the scripts used, in one place
//
// Defaults reproduce the fixed file names and column names of the source data.
// A JSON file can override any of them (same shape as the structs below).

use crate::error::{ReconcileError, Result};
use crate::reshape::PeriodRule;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// SOURCE SCHEMAS
// ============================================================================

/// Explicit schema for a wide source table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideSchema {
    /// Vocabulary name used by the label graph
    pub source: String,
    pub file: String,
    pub country_column: String,
    #[serde(default)]
    pub category_column: Option<String>,
    pub period_rule: PeriodRule,
}

/// Country column declaration for a known file family (standardizer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryColumnSchema {
    /// File name prefix this schema applies to
    pub file_prefix: String,
    pub country_column: String,
}

// ============================================================================
// PER-PIPELINE SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardizerConfig {
    pub reference_file: String,
    pub reference_column: String,
    /// Files starting with this prefix carry a metadata preamble
    pub bulk_export_prefix: String,
    pub bulk_export_skip_rows: usize,
    /// Heuristic fallback, tried in order
    pub candidate_columns: Vec<String>,
    pub schemas: Vec<CountryColumnSchema>,
    /// Extra raw → canonical entries merged over the built-in map
    pub extra_rename_file: Option<PathBuf>,
}

impl Default for StandardizerConfig {
    fn default() -> Self {
        StandardizerConfig {
            reference_file: "gdp_cleaned.csv".to_string(),
            reference_column: "Country Name".to_string(),
            bulk_export_prefix: "API_".to_string(),
            bulk_export_skip_rows: 4,
            candidate_columns: vec![
                "Country".to_string(),
                "Entity".to_string(),
                "Country Name".to_string(),
            ],
            schemas: vec![
                CountryColumnSchema {
                    file_prefix: "API_".to_string(),
                    country_column: "Country Name".to_string(),
                },
                CountryColumnSchema {
                    file_prefix: "Coffee_".to_string(),
                    country_column: "Country".to_string(),
                },
                CountryColumnSchema {
                    file_prefix: "country_pop".to_string(),
                    country_column: "Country Name".to_string(),
                },
            ],
            extra_rename_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    pub domestic: WideSchema,
    pub imports: WideSchema,
    pub population: WideSchema,
    pub merged_output: String,
    pub summary_output: String,
    /// How many rows / countries the console summary shows
    pub preview_rows: usize,
}

impl Default for MergerConfig {
    fn default() -> Self {
        MergerConfig {
            domestic: WideSchema {
                source: "domestic".to_string(),
                file: "Coffee_domestic_consumption.csv".to_string(),
                country_column: "Country".to_string(),
                category_column: Some("Coffee type".to_string()),
                period_rule: PeriodRule::Separator('/'),
            },
            imports: WideSchema {
                source: "importers".to_string(),
                file: "Coffee_importers_consumption.csv".to_string(),
                country_column: "Country".to_string(),
                category_column: None,
                period_rule: PeriodRule::Numeric,
            },
            population: WideSchema {
                source: "population".to_string(),
                file: "country_pop.csv".to_string(),
                country_column: "Country Name".to_string(),
                category_column: None,
                period_rule: PeriodRule::YearRange { from: 1990, to: 2024 },
            },
            merged_output: "Coffee_consumption_per_capita.csv".to_string(),
            summary_output: "Coffee_consumption_summary.csv".to_string(),
            preview_rows: 10,
        }
    }
}

/// One ranked table for the verifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSource {
    pub title: String,
    pub file: String,
    pub label_column: String,
    pub value_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub sources: Vec<RankingSource>,
    pub top_n: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig {
            sources: vec![
                RankingSource {
                    title: "Top 10 Coffee Exporters".to_string(),
                    file: "Coffee_export.csv".to_string(),
                    label_column: "Country".to_string(),
                    value_column: "Total_export".to_string(),
                },
                RankingSource {
                    title: "Top 10 Coffee Importers".to_string(),
                    file: "Coffee_import.csv".to_string(),
                    label_column: "Country".to_string(),
                    value_column: "Total_import".to_string(),
                },
            ],
            top_n: 10,
        }
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub standardizer: StandardizerConfig,
    pub merger: MergerConfig,
    pub verifier: VerifierConfig,
}

impl PipelineConfig {
    /// Load overrides from a JSON file; missing sections keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a pipeline meaningless
    pub fn validate(&self) -> Result<()> {
        if self.standardizer.candidate_columns.is_empty() && self.standardizer.schemas.is_empty() {
            return Err(ReconcileError::Config(
                "standardizer needs at least one schema or candidate column".to_string(),
            ));
        }

        if self.verifier.top_n == 0 {
            return Err(ReconcileError::Config("verifier.top_n must be at least 1".to_string()));
        }

        if let PeriodRule::YearRange { from, to } = self.merger.population.period_rule {
            if from > to {
                return Err(ReconcileError::Config(format!(
                    "population year range is empty ({}..={})",
                    from, to
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
