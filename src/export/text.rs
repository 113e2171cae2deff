use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use tracing::{debug, info};

use crate::reader::FmpReader;
use crate::schema::Schema;

/// Write the `original_name,clean_name` table for `schema`.
pub fn write_headers_csv<W: Write>(schema: &Schema, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(["original_name", "clean_name"])
        .context("writing header row")?;
    for (original, clean) in schema.name_pairs() {
        writer
            .write_record([original, clean])
            .with_context(|| format!("writing mapping for {}", original))?;
    }
    writer.flush().context("flushing header CSV")?;
    debug!(fields = schema.field_count(), "wrote header CSV");
    Ok(())
}

/// Stream every record as one JSON object per line. Returns the row count.
pub fn write_json_lines<R: BufRead, W: Write>(reader: FmpReader<R>, mut out: W) -> Result<u64> {
    let mut rows = 0u64;
    for record in reader.into_records() {
        let record = record.context("decoding export")?;
        serde_json::to_writer(&mut out, &record)
            .with_context(|| format!("serializing row {}", record.row()))?;
        out.write_all(b"\n")?;
        rows += 1;
    }
    out.flush()?;
    info!(rows, "wrote JSON lines");
    Ok(rows)
}
