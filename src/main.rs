use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use fmpscraper::{
    export::{self, ExportOptions, DEFAULT_BATCH_SIZE},
    fetch::download_fmp_file,
    reader::{FmpItem, FmpReader, NumberedNameResolver},
    source::{open_source, SourceInfo, SourceReader},
};
use reqwest::Client;
use std::{
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const LOG_EVERY: u64 = 10_000;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Stream FileMaker FMPXMLRESULT exports into CSV, JSON lines and Parquet"
)]
struct Cli {
    /// Number clashing column names (`name_2`, `name_3`, ...) instead of failing
    #[arg(long, global = true)]
    dedupe_names: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the `original_name,clean_name` table to stdout
    DumpHeaders { path: PathBuf },
    /// Decode every record and report the count
    Print { path: PathBuf },
    /// Write every record to stdout as one JSON object per line
    ToJson { path: PathBuf },
    /// Write the export to a Parquet file
    ToParquet(ToParquetArgs),
    /// Archive the remote export if it changed since the last download
    Download {
        url: String,
        #[arg(short, long, env = "FMP_ARCHIVE_PATH", default_value = "archive")]
        archive_path: PathBuf,
    },
}

#[derive(Args)]
struct ToParquetArgs {
    /// Export file, or an archive directory (newest `.bz2` is used)
    path: PathBuf,
    out: PathBuf,
    /// Defaults to the cleaned DATABASE name
    #[arg(long)]
    table_name: Option<String>,
    /// Label source as `file[:column]`, e.g. an edited `dump-headers` CSV
    #[arg(long)]
    mapping_column: Option<String>,
    /// Extra footer metadata, repeatable
    #[arg(long = "metadata", value_parser = parse_key_val)]
    metadata: Vec<(String, String)>,
    #[arg(long, env = "FMP_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    #[arg(long)]
    overwrite: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got {:?}", s))?;
    if k.is_empty() {
        return Err(anyhow!("empty key in {:?}", s));
    }
    Ok((k.to_string(), v.to_string()))
}

fn open_decoder(path: &Path, dedupe_names: bool) -> Result<(FmpReader<SourceReader>, SourceInfo)> {
    let (reader, info) = open_source(path)?.into_parts();
    let decoder = if dedupe_names {
        FmpReader::with_resolver(reader, NumberedNameResolver)
    } else {
        FmpReader::new(reader)
    };
    Ok((decoder, info))
}

/// Decode-side subcommands. These are blocking and run on the blocking pool.
fn run_local(command: Command, dedupe_names: bool, start: Instant) -> Result<()> {
    match command {
        Command::DumpHeaders { path } => {
            let (mut decoder, _) = open_decoder(&path, dedupe_names)?;
            let schema = decoder.read_schema().context("reading export header")?;
            export::write_headers_csv(&schema, io::stdout().lock())?;
        }
        Command::Print { path } => {
            let (decoder, info) = open_decoder(&path, dedupe_names)?;
            let mut rows = 0u64;
            for item in decoder {
                match item? {
                    FmpItem::Schema(schema) => {
                        info!(
                            "Parsing {} records from {}",
                            schema.resultset_record_count, schema.name
                        );
                    }
                    FmpItem::Record(_) => {
                        rows += 1;
                        if rows % LOG_EVERY == 0 {
                            info!(rows, "progress");
                        }
                    }
                }
            }
            info!(rows, sha256 = %info.digest.hex(), elapsed = ?start.elapsed(), "Done");
        }
        Command::ToJson { path } => {
            let (decoder, _) = open_decoder(&path, dedupe_names)?;
            let out = BufWriter::new(io::stdout().lock());
            let rows = export::write_json_lines(decoder, out)?;
            info!(rows, elapsed = ?start.elapsed(), "Done");
        }
        Command::ToParquet(args) => {
            let mapping = match &args.mapping_column {
                Some(arg) => export::read_mapping(arg)?,
                None => Default::default(),
            };
            let options = ExportOptions {
                table_name: args.table_name,
                batch_size: args.batch_size,
                mapping,
                metadata: args.metadata,
                overwrite: args.overwrite,
            };
            let (decoder, info) = open_decoder(&args.path, dedupe_names)?;
            let summary = export::write_parquet(decoder, &args.out, Some(&info), &options)?;
            for w in &summary.warnings {
                warn!("{}", w);
            }
            info!(
                rows = summary.rows,
                table = %summary.table_name,
                out = %summary.path.display(),
                elapsed = ?start.elapsed(),
                "Done"
            );
        }
        Command::Download { .. } => return Err(anyhow!("download needs the async runtime")),
    }
    io::stdout().flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    match cli.command {
        Command::Download { url, archive_path } => {
            let client = Client::new();
            match download_fmp_file(&client, &url, &archive_path).await? {
                Some(entry) => info!(file = %entry.filename, sha256 = %entry.sha256, "archived"),
                None => info!("No download needed"),
            }
            Ok(())
        }
        command => {
            let dedupe_names = cli.dedupe_names;
            tokio::task::spawn_blocking(move || run_local(command, dedupe_names, start))
                .await
                .context("decode task panicked")?
        }
    }
}
