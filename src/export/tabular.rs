// src/export/tabular.rs

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::Utc;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufRead, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};

use super::{ExportOptions, ORIGINAL_NAME_KEY};
use crate::reader::{DecodeWarning, FmpReader};
use crate::schema::Schema;
use crate::source::SourceInfo;

/// What a finished Parquet export contains.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub table_name: String,
    pub rows: u64,
    pub source_sha256: Option<String>,
    pub warnings: Vec<DecodeWarning>,
}

/// Arrow schema for `schema`: one nullable Utf8 column per field, labelled
/// with `original_name` field metadata.
pub fn arrow_schema(schema: &Schema, mapping: &HashMap<String, String>) -> SchemaRef {
    let fields: Vec<ArrowField> = schema
        .fields
        .iter()
        .map(|f| {
            let label = match mapping.get(&f.sanitized_name) {
                Some(label) => label.clone(),
                None => {
                    if !mapping.is_empty() {
                        warn!(column = %f.sanitized_name, "no entry in name mapping, keeping header name");
                    }
                    f.original_name.clone()
                }
            };
            ArrowField::new(&f.sanitized_name, DataType::Utf8, true)
                .with_metadata(HashMap::from([(ORIGINAL_NAME_KEY.to_string(), label)]))
        })
        .collect();
    Arc::new(ArrowSchema::new(fields))
}

/// Column-major buffer for one record batch.
struct BatchBuilder {
    schema: SchemaRef,
    columns: Vec<Vec<Option<String>>>,
    rows: usize,
}

impl BatchBuilder {
    fn new(schema: SchemaRef, capacity: usize) -> Self {
        let columns = (0..schema.fields().len())
            .map(|_| Vec::with_capacity(capacity))
            .collect();
        Self {
            schema,
            columns,
            rows: 0,
        }
    }

    fn push(&mut self, values: Vec<Option<String>>) {
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(value);
        }
        self.rows += 1;
    }

    fn take(&mut self) -> Result<RecordBatch> {
        let arrays: Vec<ArrayRef> = self
            .columns
            .iter_mut()
            .map(|c| Arc::new(StringArray::from(std::mem::take(c))) as ArrayRef)
            .collect();
        let options = RecordBatchOptions::new().with_row_count(Some(self.rows));
        self.rows = 0;
        RecordBatch::try_new_with_options(self.schema.clone(), arrays, &options)
            .context("building record batch")
    }
}

/// Decode `reader` into a Parquet file at `out`.
///
/// The file is written next to `out` with a `.tmp` suffix and renamed once
/// complete, so a failed decode never leaves a partial table behind.
#[instrument(level = "info", skip(reader, out, source, options), fields(out = %out.display()))]
pub fn write_parquet<R: BufRead>(
    reader: FmpReader<R>,
    out: &Path,
    source: Option<&SourceInfo>,
    options: &ExportOptions,
) -> Result<ExportSummary> {
    if out.exists() && !options.overwrite {
        bail!(
            "{} already exists; pass --overwrite to replace it",
            out.display()
        );
    }
    let tmp_path = PathBuf::from(format!("{}.tmp", out.display()));

    match write_to(reader, &tmp_path, source, options) {
        Ok(mut summary) => {
            fs::rename(&tmp_path, out).with_context(|| {
                format!(
                    "failed to rename `{}` to `{}`",
                    tmp_path.display(),
                    out.display()
                )
            })?;
            summary.path = out.to_path_buf();
            info!(rows = summary.rows, table = %summary.table_name, "wrote parquet");
            Ok(summary)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&tmp_path) {
                debug!(error = %rm, "could not remove temporary file");
            }
            Err(e)
        }
    }
}

fn write_to<R: BufRead>(
    mut reader: FmpReader<R>,
    tmp_path: &Path,
    source: Option<&SourceInfo>,
    options: &ExportOptions,
) -> Result<ExportSummary> {
    let schema = reader.read_schema().context("reading export header")?;
    let table_name = options
        .table_name
        .clone()
        .unwrap_or_else(|| schema.table_name.clone());
    let arrow = arrow_schema(&schema, &options.mapping);
    let batch_size = options.batch_size.max(1);

    let file = File::create(tmp_path)
        .with_context(|| format!("could not create temporary file `{}`", tmp_path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), arrow.clone(), Some(props))
        .context("creating ArrowWriter")?;

    let mut builder = BatchBuilder::new(arrow, batch_size);
    let mut rows = 0u64;
    while let Some(item) = reader.next() {
        let Some(record) = item.context("decoding export")?.into_record() else {
            continue;
        };
        builder.push(record.into_values());
        rows += 1;
        if builder.rows == batch_size {
            writer.write(&builder.take()?).context("writing batch")?;
            debug!(rows, "flushed batch");
        }
    }
    if builder.rows > 0 {
        writer.write(&builder.take()?).context("writing final batch")?;
    }

    let source_sha256 = source.map(|s| s.digest.hex());
    let mut footer = vec![
        ("created_at".to_string(), Utc::now().to_rfc3339()),
        ("source_schema_name".to_string(), schema.name.clone()),
        ("record_count".to_string(), rows.to_string()),
        (
            "declared_record_count".to_string(),
            schema.declared_record_count.to_string(),
        ),
        ("table_name".to_string(), table_name.clone()),
    ];
    if let Some(source) = source {
        footer.push((
            "source_path".to_string(),
            source.path.display().to_string(),
        ));
    }
    if let Some(sha) = &source_sha256 {
        footer.push(("source_sha256".to_string(), sha.clone()));
    }
    if !reader.warnings().is_empty() {
        let joined = reader
            .warnings()
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        footer.push(("decode_warnings".to_string(), joined));
    }
    footer.extend(options.metadata.iter().cloned());
    for (key, value) in footer {
        writer.append_key_value_metadata(KeyValue::new(key, value));
    }

    let mut inner = writer.into_inner().context("closing ArrowWriter")?;
    inner.flush().context("flushing parquet file")?;

    Ok(ExportSummary {
        path: tmp_path.to_path_buf(),
        table_name,
        rows,
        source_sha256,
        warnings: reader.warnings().to_vec(),
    })
}
