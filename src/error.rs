// ⚠️ Error types shared by every pipeline stage
//
// Library code returns `Result<T>` with a `ReconcileError`; the binary and the
// pipeline entry points wrap these in `anyhow` with file context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A column the schema requires is not in the header row
    #[error("Missing column '{column}' in {table}")]
    MissingColumn { table: String, column: String },

    /// No header row left after skipping the preamble
    #[error("No header row in {0}")]
    EmptyFile(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
