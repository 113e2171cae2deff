// src/export/mod.rs

use std::collections::HashMap;

pub mod mapping;
pub mod tabular;
pub mod text;

pub use mapping::read_mapping;
pub use tabular::{write_parquet, ExportSummary};
pub use text::{write_headers_csv, write_json_lines};

/// Rows buffered per Arrow record batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Field-metadata key carrying the label of each column.
pub const ORIGINAL_NAME_KEY: &str = "original_name";

/// Knobs for [`write_parquet`].
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Overrides the schema's derived table name.
    pub table_name: Option<String>,
    pub batch_size: usize,
    /// Sanitized name -> label stored as `original_name`. Empty keeps the
    /// names from the export header.
    pub mapping: HashMap<String, String>,
    /// Extra key/value pairs for the file footer.
    pub metadata: Vec<(String, String)>,
    pub overwrite: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            table_name: None,
            batch_size: DEFAULT_BATCH_SIZE,
            mapping: HashMap::new(),
            metadata: Vec::new(),
            overwrite: false,
        }
    }
}
