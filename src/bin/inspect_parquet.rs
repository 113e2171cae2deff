use anyhow::{Context, Result};
use fmpscraper::export::ORIGINAL_NAME_KEY;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{env, fs::File, path::Path, process::exit};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <PARQUET_FILE>", args[0]);
        exit(1);
    }
    if let Err(e) = inspect_parquet(Path::new(&args[1])) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

/// Print row count, column labels and footer metadata of an exported table.
fn inspect_parquet(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet footer of {}", path.display()))?;
    let parquet_meta = builder.metadata();
    let file_meta = parquet_meta.file_metadata();

    println!("=== Parquet File: {} ===", path.display());
    println!("Rows:                 {}", file_meta.num_rows());
    println!("Row groups:           {}", parquet_meta.num_row_groups());
    println!(
        "Created by:           {}",
        file_meta.created_by().unwrap_or("<unknown>")
    );
    println!();

    println!("=== Columns ===");
    for field in builder.schema().fields() {
        let label = field
            .metadata()
            .get(ORIGINAL_NAME_KEY)
            .map(String::as_str)
            .unwrap_or("<none>");
        println!("- {:<30} | {}", field.name(), label);
    }
    println!();

    println!("=== Metadata ===");
    let mut pairs: Vec<(&str, &str)> = file_meta
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                // the serialized Arrow schema is already shown above
                .filter(|kv| kv.key != "ARROW:schema")
                .map(|kv| (kv.key.as_str(), kv.value.as_deref().unwrap_or("")))
                .collect()
        })
        .unwrap_or_default();
    pairs.sort();
    for (key, value) in pairs {
        println!("{:<24} {}", key, value);
    }
    Ok(())
}
