// src/source/mod.rs

use anyhow::{anyhow, Context, Result};
use bzip2::read::MultiBzDecoder;
use glob::glob;
use std::{
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};
use zip::ZipArchive;

pub mod hashing;

pub use hashing::{DigestHandle, HashingReader};

const READ_BUFFER: usize = 64 * 1024;

/// How the bytes on disk are wrapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Plain,
    Bzip2,
    Zip,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("bz2") => SourceKind::Bzip2,
            Some("zip") => SourceKind::Zip,
            _ => SourceKind::Plain,
        }
    }
}

pub type SourceReader = BufReader<HashingReader<Box<dyn Read + Send>>>;

/// An export opened for decoding. Dropping it closes the file.
pub struct OpenedSource {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub reader: SourceReader,
    pub digest: DigestHandle,
}

/// Where a decoded stream came from, kept after the reader is handed off.
#[derive(Clone)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub digest: DigestHandle,
}

impl OpenedSource {
    pub fn into_parts(self) -> (SourceReader, SourceInfo) {
        (
            self.reader,
            SourceInfo {
                path: self.path,
                digest: self.digest,
            },
        )
    }
}

/// Open an export for streaming.
///
/// A directory resolves to its last `*.bz2` file by name. `.bz2` is
/// decompressed on the fly, `.zip` yields its first `.xml` entry, anything
/// else is read as XML.
#[instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
pub fn open_source(path: impl AsRef<Path>) -> Result<OpenedSource> {
    let path = resolve_path(path.as_ref())?;
    let kind = SourceKind::from_path(&path);
    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;

    let inner: Box<dyn Read + Send> = match kind {
        SourceKind::Plain => Box::new(file),
        SourceKind::Bzip2 => Box::new(MultiBzDecoder::new(BufReader::new(file))),
        SourceKind::Zip => Box::new(extract_xml_entry(file, &path)?),
    };
    info!(path = %path.display(), ?kind, "opened source");

    let digest = DigestHandle::new();
    let reader = BufReader::with_capacity(READ_BUFFER, HashingReader::new(inner, digest.clone()));
    Ok(OpenedSource {
        path,
        kind,
        reader,
        digest,
    })
}

/// Directories stand for the newest archived export, by file name.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    let pattern = format!("{}/*.bz2", path.display());
    let mut files: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("bad glob pattern {}", pattern))?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();
    let latest = files
        .pop()
        .ok_or_else(|| anyhow!("no .bz2 files in {}", path.display()))?;
    debug!(latest = %latest.display(), "resolved directory");
    Ok(latest)
}

/// Copy the first `.xml` entry into an anonymous temp file so it can be
/// streamed without holding the archive borrow.
fn extract_xml_entry(file: File, path: &Path) -> Result<File> {
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {:?}", path))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to access ZIP entry #{} in {:?}", i, path))?;
        if !entry.is_file() || !entry.name().to_lowercase().ends_with(".xml") {
            continue;
        }
        let name = entry.name().to_string();
        let mut out = tempfile::tempfile().context("creating temp file for ZIP entry")?;
        let copied = io::copy(&mut entry, &mut out)
            .with_context(|| format!("extracting {} from {:?}", name, path))?;
        out.seek(SeekFrom::Start(0))?;
        debug!(entry = %name, bytes = copied, "extracted ZIP entry");
        return Ok(out);
    }
    Err(anyhow!("no .xml entry in ZIP archive {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use sha2::{Digest, Sha256};
    use std::{fs, io::Write};
    use tempfile::tempdir;
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    const XML: &str = r#"<FMPXMLRESULT xmlns="http://www.filemaker.com/fmp/1/result"><DATABASE NAME="t" RECORDS="0"/><RESULTSET FOUND="0"></RESULTSET></FMPXMLRESULT>"#;

    fn read_all(mut source: OpenedSource) -> Result<(String, String)> {
        let mut text = String::new();
        source.reader.read_to_string(&mut text)?;
        Ok((text, source.digest.hex()))
    }

    fn bz2(content: &[u8]) -> Result<Vec<u8>> {
        let mut enc = BzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(content)?;
        Ok(enc.finish()?)
    }

    #[test]
    fn plain_bz2_and_zip_yield_the_same_xml() -> Result<()> {
        let dir = tempdir()?;
        let expected_digest = format!("{:x}", Sha256::digest(XML.as_bytes()));

        let plain = dir.path().join("export.xml");
        fs::write(&plain, XML)?;

        let compressed = dir.path().join("export.xml.bz2");
        fs::write(&compressed, bz2(XML.as_bytes())?)?;

        let zipped = dir.path().join("2025-01-01T00-00-00.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&zipped)?);
            let options: FileOptions<'_, ()> =
                FileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file("readme.txt", options)?;
            zip.write_all(b"not this one")?;
            zip.start_file("ceneton.xml", options)?;
            zip.write_all(XML.as_bytes())?;
            zip.finish()?;
        }

        for (path, kind) in [
            (&plain, SourceKind::Plain),
            (&compressed, SourceKind::Bzip2),
            (&zipped, SourceKind::Zip),
        ] {
            let source = open_source(path)?;
            assert_eq!(source.kind, kind);
            let (text, digest) = read_all(source)?;
            assert_eq!(text, XML);
            assert_eq!(digest, expected_digest);
        }
        Ok(())
    }

    #[test]
    fn directory_resolves_to_latest_bz2() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("2024-01-01T00-00-00.bz2"), bz2(b"old")?)?;
        fs::write(dir.path().join("2025-06-01T00-00-00.bz2"), bz2(b"new")?)?;
        fs::write(dir.path().join("2030-01-01T00-00-00.zip"), b"ignored")?;

        let source = open_source(dir.path())?;
        assert!(source.path.ends_with("2025-06-01T00-00-00.bz2"));
        let (text, _) = read_all(source)?;
        assert_eq!(text, "new");
        Ok(())
    }

    #[test]
    fn empty_directory_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        assert!(open_source(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn zip_without_xml_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let zipped = dir.path().join("empty.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&zipped)?);
            let options: FileOptions<'_, ()> =
                FileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file("data.csv", options)?;
            zip.write_all(b"a,b")?;
            zip.finish()?;
        }
        let err = open_source(&zipped).err().expect("should fail");
        assert!(err.to_string().contains("no .xml entry"));
        Ok(())
    }
}
