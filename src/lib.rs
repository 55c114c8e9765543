// Coffee Reconcile - Core Library
// Exposes all pipeline stages for use in the CLI and tests

pub mod error;
pub mod value;          // Measurement parsing - sentinel/NaN handling
pub mod table;          // CSV tables with preamble + BOM preserved
pub mod config;         // Schemas and per-stage settings
pub mod reshape;        // Wide → long melt
pub mod names;          // Rename maps and label graph
pub mod join;           // Outer join + population fallback
pub mod merge;          // Consumption merger pipeline
pub mod aggregate;      // Per-country summary
pub mod rank;           // Top-N ranking
pub mod standardize;    // Name standardizer pipeline
pub mod verify;         // Ranking verifier pipeline

// Re-export commonly used types
pub use error::{ReconcileError, Result};
pub use value::{classify_measurement, parse_measurement, Measurement, UNAVAILABLE_SENTINEL};
pub use table::Table;
pub use config::{
    CountryColumnSchema, MergerConfig, PipelineConfig, RankingSource,
    StandardizerConfig, VerifierConfig, WideSchema,
};
pub use reshape::{melt, Observation, PeriodRule, ReshapeReport};
pub use names::{
    builtin, LabelGraph, ReconcileReport, Reconciler, RenameMap, UnmatchedLabel,
};
pub use join::{
    join_with_population, outer_join, FallbackRepair, JoinReport, JoinedRow, PopulationIndex,
};
pub use merge::{
    build_records, per_capita, run_merge, run_merge_with_graph, total_consumption,
    MergeOutcome, MergeReport, MergedRecord,
};
pub use aggregate::{summarize, top_by_mean_per_capita, CountrySummary};
pub use rank::{format_thousands, rank_top, RankedEntry};
pub use standardize::{
    rename_map, run_standardize, Detection, FileOutcome, StandardizeReport, Standardizer,
};
pub use verify::{run_verify, Ranking, RankingReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
