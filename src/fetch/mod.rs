// src/fetch/mod.rs

//! Keeps a local archive of a remotely published export, downloading a new
//! copy only when the server reports a different size or ETag.

pub mod archive;
pub mod download;

pub use archive::{ArchiveEntry, ArchiveIndex, RemoteMeta, INDEX_FILE};
pub use download::download_fmp_file;
