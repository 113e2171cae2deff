// src/fetch/archive.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Name of the YAML index kept inside the archive directory.
pub const INDEX_FILE: &str = "index.yml";

/// One downloaded version of the remote export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub filename: String,
    pub size: u64,
    #[serde(default)]
    pub etag: Option<String>,
    pub last_modified: String,
    pub last_modified_ts: DateTime<Utc>,
    pub url: String,
    pub sha256: String,
}

/// Freshness headers of the remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMeta {
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: String,
    pub last_modified_ts: DateTime<Utc>,
}

impl RemoteMeta {
    /// `<%Y-%m-%dT%H-%M-%S>.<ext>` from the Last-Modified time.
    pub fn archive_filename(&self, ext: &str) -> String {
        format!("{}.{}", self.last_modified_ts.format("%Y-%m-%dT%H-%M-%S"), ext)
    }
}

/// The archive index: every downloaded version, oldest first.
#[derive(Debug)]
pub struct ArchiveIndex {
    path: PathBuf,
    entries: Vec<ArchiveEntry>,
}

impl ArchiveIndex {
    /// Load `<dir>/index.yml`, or start empty.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(INDEX_FILE);
        let entries = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading archive index {}", path.display()))?;
            if text.trim().is_empty() {
                Vec::new()
            } else {
                serde_yaml::from_str(&text)
                    .with_context(|| format!("parsing archive index {}", path.display()))?
            }
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded archive index");
        Ok(Self { path, entries })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ArchiveEntry> {
        self.entries.last()
    }

    /// A download is due when nothing is archived yet or the size or ETag moved.
    pub fn needs_download(&self, remote: &RemoteMeta) -> bool {
        match self.last() {
            None => true,
            Some(last) => last.size != remote.size || last.etag != remote.etag,
        }
    }

    /// Add `entry` and keep entries ordered by modification time.
    pub fn push(&mut self, entry: ArchiveEntry) {
        self.entries.push(entry);
        self.entries.sort_by_key(|e| e.last_modified_ts);
    }

    /// Rewrite the index through a temporary file.
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.entries).context("serializing archive index")?;
        let tmp = self.path.with_extension("yml.tmp");
        fs::write(&tmp, yaml).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!("renaming {} -> {}", tmp.display(), self.path.display())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn entry(day: u32, size: u64, etag: &str) -> ArchiveEntry {
        let ts = Utc.with_ymd_and_hms(2025, 3, day, 10, 0, 0).unwrap();
        ArchiveEntry {
            filename: format!("{}.zip", ts.format("%Y-%m-%dT%H-%M-%S")),
            size,
            etag: Some(etag.to_string()),
            last_modified: ts.to_rfc2822(),
            last_modified_ts: ts,
            url: "https://example.org/ceneton.zip".into(),
            sha256: "00".repeat(32),
        }
    }

    fn remote(size: u64, etag: &str) -> RemoteMeta {
        let ts = Utc.with_ymd_and_hms(2025, 3, 20, 8, 30, 5).unwrap();
        RemoteMeta {
            size,
            etag: Some(etag.to_string()),
            last_modified: ts.to_rfc2822(),
            last_modified_ts: ts,
        }
    }

    #[test]
    fn empty_archive_always_downloads() -> Result<()> {
        let dir = tempdir()?;
        let index = ArchiveIndex::load(dir.path())?;
        assert!(index.entries().is_empty());
        assert!(index.needs_download(&remote(10, "\"a\"")));
        Ok(())
    }

    #[test]
    fn size_or_etag_change_triggers_download() -> Result<()> {
        let dir = tempdir()?;
        let mut index = ArchiveIndex::load(dir.path())?;
        index.push(entry(1, 10, "\"a\""));

        assert!(!index.needs_download(&remote(10, "\"a\"")));
        assert!(index.needs_download(&remote(11, "\"a\"")));
        assert!(index.needs_download(&remote(10, "\"b\"")));
        Ok(())
    }

    #[test]
    fn index_is_sorted_and_survives_reload() -> Result<()> {
        let dir = tempdir()?;
        let mut index = ArchiveIndex::load(dir.path())?;
        index.push(entry(9, 30, "\"c\""));
        index.push(entry(2, 10, "\"a\""));
        index.save()?;
        assert!(!dir.path().join("index.yml.tmp").exists());

        let reloaded = ArchiveIndex::load(dir.path())?;
        assert_eq!(reloaded.entries().len(), 2);
        assert_eq!(reloaded.entries()[0].size, 10);
        assert_eq!(reloaded.last().map(|e| e.size), Some(30));
        assert_eq!(reloaded.entries(), index.entries());
        Ok(())
    }

    #[test]
    fn archive_filename_uses_last_modified() {
        assert_eq!(remote(1, "x").archive_filename("zip"), "2025-03-20T08-30-05.zip");
    }
}
