use sha2::{Digest, Sha256};
use std::{
    io::{self, Read},
    sync::{Arc, Mutex},
};

#[derive(Default)]
struct DigestState {
    hasher: Sha256,
    bytes: u64,
}

/// Shared view on the running SHA-256 of everything read so far.
#[derive(Clone, Default)]
pub struct DigestHandle(Arc<Mutex<DigestState>>);

impl DigestHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, chunk: &[u8]) {
        let mut state = self.0.lock().unwrap_or_else(|p| p.into_inner());
        state.hasher.update(chunk);
        state.bytes += chunk.len() as u64;
    }

    /// Hex digest of the bytes read up to now.
    pub fn hex(&self) -> String {
        let state = self.0.lock().unwrap_or_else(|p| p.into_inner());
        format!("{:x}", state.hasher.clone().finalize())
    }

    pub fn bytes_read(&self) -> u64 {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).bytes
    }
}

/// Passes bytes through unchanged while feeding them to a `DigestHandle`.
pub struct HashingReader<R> {
    inner: R,
    digest: DigestHandle,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, digest: DigestHandle) -> Self {
        Self { inner, digest }
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn digest_matches_one_shot_hash() -> anyhow::Result<()> {
        let content = b"<FMPXMLRESULT/>".repeat(1000);
        let handle = DigestHandle::new();
        let mut reader = HashingReader::new(Cursor::new(content.clone()), handle.clone());
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink)?;

        assert_eq!(sink, content);
        assert_eq!(handle.bytes_read(), content.len() as u64);
        assert_eq!(handle.hex(), format!("{:x}", Sha256::digest(&content)));
        Ok(())
    }
}
