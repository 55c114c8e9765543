// 📄 Table - In-memory CSV with header, rows, and preserved preamble
//
// Bulk-export files carry metadata lines above the header. Those lines are
// kept as-is so an overwrite does not change the file's layout.

use crate::error::{ReconcileError, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs;
use std::path::Path;

const UTF8_BOM: char = '\u{feff}';

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Name used in diagnostics (usually the file name)
    pub name: String,

    /// Header cells as read; lookups ignore surrounding whitespace
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,

    /// Raw lines that preceded the header (written back verbatim)
    pub preamble: Vec<String>,

    /// Source started with a UTF-8 byte order mark
    pub had_bom: bool,
}

impl Table {
    pub fn new(name: &str, headers: Vec<String>) -> Self {
        Table {
            name: name.to_string(),
            headers,
            ..Default::default()
        }
    }

    /// Load a CSV file, skipping `skip_lines` preamble lines before the header
    pub fn from_path(path: &Path, skip_lines: usize) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv");
        Self::from_str_named(name, &content, skip_lines)
    }

    /// Parse CSV text; exposed separately so tests don't need files
    pub fn from_str_named(name: &str, content: &str, skip_lines: usize) -> Result<Self> {
        let (had_bom, content) = match content.strip_prefix(UTF8_BOM) {
            Some(rest) => (true, rest),
            None => (false, content),
        };

        let mut preamble = Vec::with_capacity(skip_lines);
        let mut body = content;
        for _ in 0..skip_lines {
            match body.find('\n') {
                Some(pos) => {
                    preamble.push(body[..pos].trim_end_matches('\r').to_string());
                    body = &body[pos + 1..];
                }
                None => {
                    if !body.is_empty() {
                        preamble.push(body.trim_end_matches('\r').to_string());
                    }
                    body = "";
                    break;
                }
            }
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body.as_bytes());

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(|h| h.to_string()).collect(),
            None => return Err(ReconcileError::EmptyFile(name.to_string())),
        };

        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Table {
            name: name.to_string(),
            headers,
            rows,
            preamble,
            had_bom,
        })
    }

    /// Position of a header, ignoring surrounding whitespace
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Like `column_index`, but a missing column is an error
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| ReconcileError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Cell text, empty for short rows
    pub fn cell<'a>(&'a self, row: &'a [String], index: usize) -> &'a str {
        row.get(index).map(|s| s.as_str()).unwrap_or("")
    }

    /// All values in a column (empty strings for short rows)
    pub fn column_values(&self, column: &str) -> Result<Vec<&str>> {
        let index = self.require_column(column)?;
        Ok(self.rows.iter().map(|row| self.cell(row, index)).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize back to CSV text (BOM + preamble + header + rows)
    pub fn to_csv_string(&self) -> Result<String> {
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ReconcileError::Io(e.into_error()))?;
        let body = String::from_utf8_lossy(&bytes);

        let mut out = String::new();
        if self.had_bom {
            out.push(UTF8_BOM);
        }
        for line in &self.preamble {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&body);
        Ok(out)
    }

    /// Write the table to `path`, replacing any existing file
    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_csv_string()?)?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
