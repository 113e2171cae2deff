// src/fetch/download.rs

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LENGTH, ETAG, LAST_MODIFIED};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::archive::{ArchiveEntry, ArchiveIndex, RemoteMeta};

const DEFAULT_EXTENSION: &str = "zip";

fn header(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Read size, ETag and modification time from a HEAD response.
pub fn remote_meta(headers: &HeaderMap) -> Result<RemoteMeta> {
    let size = header(headers, CONTENT_LENGTH)
        .ok_or_else(|| anyhow!("response has no Content-Length header"))?
        .trim()
        .parse::<u64>()
        .context("parsing Content-Length")?;
    let last_modified = header(headers, LAST_MODIFIED)
        .ok_or_else(|| anyhow!("response has no Last-Modified header"))?
        .to_string();
    let last_modified_ts = DateTime::parse_from_rfc2822(&last_modified)
        .with_context(|| format!("parsing Last-Modified {:?}", last_modified))?
        .with_timezone(&Utc);
    let etag = header(headers, ETAG).map(str::to_string);

    Ok(RemoteMeta {
        size,
        etag,
        last_modified,
        last_modified_ts,
    })
}

/// Extension of the last path segment, `zip` when there is none.
pub fn extension_of(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or(DEFAULT_EXTENSION)
        .to_ascii_lowercase()
}

/// Download `url` into `archive_dir` unless the archived copy is current.
///
/// Returns the new archive entry, or `None` when nothing changed.
#[instrument(level = "info", skip(client, archive_dir), fields(archive = %archive_dir.as_ref().display()))]
pub async fn download_fmp_file(
    client: &Client,
    url: &str,
    archive_dir: impl AsRef<Path>,
) -> Result<Option<ArchiveEntry>> {
    let archive_dir = archive_dir.as_ref();
    fs::create_dir_all(archive_dir)
        .await
        .with_context(|| format!("creating archive directory {}", archive_dir.display()))?;
    let mut index = ArchiveIndex::load(archive_dir)?;

    let url = Url::parse(url).with_context(|| format!("parsing URL {}", url))?;
    let head = client
        .head(url.clone())
        .send()
        .await
        .with_context(|| format!("HEAD {}", url))?
        .error_for_status()?;
    let remote = remote_meta(head.headers())?;
    info!(
        size = remote.size,
        last_modified = %remote.last_modified,
        etag = remote.etag.as_deref().unwrap_or("<none>"),
        "remote file"
    );

    if !index.needs_download(&remote) {
        info!("No download needed");
        return Ok(None);
    }

    let filename = remote.archive_filename(&extension_of(&url));
    let dest = archive_dir.join(&filename);
    let tmp = archive_dir.join(format!("{}.tmp", filename));
    info!(file = %filename, "downloading");

    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;
    let mut stream = response.bytes_stream();
    let mut file = fs::File::create(&tmp)
        .await
        .with_context(|| format!("creating {}", tmp.display()))?;
    let mut hasher = Sha256::new();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read chunk from response")?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);
    debug!(bytes = written, "download complete");
    if written != remote.size {
        warn!(expected = remote.size, actual = written, "downloaded size differs from Content-Length");
    }

    fs::rename(&tmp, &dest)
        .await
        .with_context(|| format!("renaming {} -> {}", tmp.display(), dest.display()))?;

    let entry = ArchiveEntry {
        filename,
        size: remote.size,
        etag: remote.etag,
        last_modified: remote.last_modified,
        last_modified_ts: remote.last_modified_ts,
        url: url.to_string(),
        sha256: format!("{:x}", hasher.finalize()),
    };
    index.push(entry.clone());
    index.save()?;
    Ok(Some(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn parses_freshness_headers() -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1048576"));
        headers.insert(ETAG, HeaderValue::from_static("\"5e1-61a\""));
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Mon, 03 Mar 2025 14:07:09 GMT"),
        );

        let meta = remote_meta(&headers)?;
        assert_eq!(meta.size, 1_048_576);
        assert_eq!(meta.etag.as_deref(), Some("\"5e1-61a\""));
        assert_eq!(meta.last_modified_ts.to_rfc3339(), "2025-03-03T14:07:09+00:00");
        assert_eq!(meta.archive_filename("zip"), "2025-03-03T14-07-09.zip");
        Ok(())
    }

    #[test]
    fn missing_content_length_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Mon, 03 Mar 2025 14:07:09 GMT"),
        );
        assert!(remote_meta(&headers).is_err());
    }

    #[test]
    fn extension_comes_from_url_path() -> Result<()> {
        assert_eq!(extension_of(&Url::parse("https://x.org/dl/ceneton.XML.bz2")?), "bz2");
        assert_eq!(extension_of(&Url::parse("https://x.org/export?id=3")?), "zip");
        assert_eq!(extension_of(&Url::parse("https://x.org/data.zip")?), "zip");
        Ok(())
    }
}
