//! Blob store and per-transfer state.
//!
//! A blob is one in-flight binary transfer keyed by the session id the remote
//! side picked. Small binaries are accumulated in memory as [`UnnamedBlob`]s
//! and later consumed by a patch; large binaries stream straight to disk as
//! [`NamedBlob`]s, each owning its open file until the download ends.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Opaque identifier of one blob transfer, chosen by the remote side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Borrow the identifier as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discriminant of a stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    /// In-memory, chunk-indexed blob
    Unnamed,
    /// File-backed blob
    Named,
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobKind::Unnamed => f.write_str("unnamed"),
            BlobKind::Named => f.write_str("named"),
        }
    }
}

/// In-memory blob assembled from 1-based, strictly consecutive chunks
#[derive(Debug, Clone)]
pub struct UnnamedBlob {
    size: u64,
    index: u64,
    chunks: Vec<Vec<u8>>,
}

impl UnnamedBlob {
    /// Create an empty blob announcing `size` bytes
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            size,
            index: 0,
            chunks: Vec::new(),
        }
    }

    /// Accept the chunk carrying `index`.
    ///
    /// The index must be exactly one past the last accepted chunk. A chunk
    /// without data passes the index check but changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::OutOfOrderChunk`] if the index is not the next
    /// one; the blob is left untouched in that case.
    pub fn accept_chunk(
        &mut self,
        session: &SessionId,
        index: u64,
        data: Option<Vec<u8>>,
    ) -> Result<()> {
        let expected = self.index + 1;
        if index != expected {
            return Err(BridgeError::OutOfOrderChunk {
                session: session.clone(),
                expected,
                actual: index,
            });
        }

        if let Some(data) = data {
            self.chunks.push(data);
            self.index = expected;
        }

        Ok(())
    }

    /// Size announced by the begin event
    #[must_use]
    pub fn declared_size(&self) -> u64 {
        self.size
    }

    /// Index of the last accepted chunk (0 before the first)
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.index
    }

    /// Accepted chunks, in index order
    #[must_use]
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Total bytes received so far
    #[must_use]
    pub fn received(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate the chunks into one contiguous buffer
    #[must_use]
    pub fn assemble(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

/// File-backed blob streaming a download to local storage
#[derive(Debug)]
pub struct NamedBlob {
    filename: String,
    path: PathBuf,
    file: File,
    bytes_written: u64,
}

impl NamedBlob {
    /// Wrap a freshly opened destination file
    pub fn new(filename: impl Into<String>, path: impl Into<PathBuf>, file: File) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
            file,
            bytes_written: 0,
        }
    }

    /// Append `data` at the current position and wait for it to land
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the write fails.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .await
            .map_err(|e| BridgeError::io(&self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| BridgeError::io(&self.path, e))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush and close the file, returning the number of bytes written
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the final flush fails.
    pub async fn close(mut self) -> Result<u64> {
        self.file
            .flush()
            .await
            .map_err(|e| BridgeError::io(&self.path, e))?;
        drop(self.file);
        Ok(self.bytes_written)
    }

    /// Remote path of the file
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Local destination path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// A stored transfer
#[derive(Debug)]
pub enum Blob {
    /// Chunk-copy transfer held in memory
    Unnamed(UnnamedBlob),
    /// Download streamed to disk
    Named(NamedBlob),
}

impl Blob {
    /// Kind of this blob
    #[must_use]
    pub fn kind(&self) -> BlobKind {
        match self {
            Blob::Unnamed(_) => BlobKind::Unnamed,
            Blob::Named(_) => BlobKind::Named,
        }
    }
}

/// Outcome of tearing down a store
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    /// Remote filenames of downloads that were still open
    pub incomplete_downloads: Vec<String>,
    /// In-memory blobs released
    pub released_blobs: usize,
    /// Descriptors whose final flush failed
    pub close_failures: usize,
}

/// Session id → blob mapping for one processing context
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: HashMap<SessionId, Blob>,
}

impl BlobStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True if no entry is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// True if `session` has an entry
    #[must_use]
    pub fn contains(&self, session: &SessionId) -> bool {
        self.blobs.contains_key(session)
    }

    /// Kind of the entry stored under `session`
    #[must_use]
    pub fn kind(&self, session: &SessionId) -> Option<BlobKind> {
        self.blobs.get(session).map(Blob::kind)
    }

    /// Look up an entry
    #[must_use]
    pub fn get(&self, session: &SessionId) -> Option<&Blob> {
        self.blobs.get(session)
    }

    /// Fail if a begin event may not claim `session`.
    ///
    /// Unnamed entries are reset by a new begin; an open download is never
    /// replaced because its descriptor would be orphaned.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SessionInUse`] if a download is open under the key.
    pub fn check_begin(&self, session: &SessionId) -> Result<()> {
        match self.blobs.get(session) {
            Some(Blob::Named(_)) => Err(BridgeError::SessionInUse(session.clone())),
            _ => Ok(()),
        }
    }

    /// Start (or restart) an in-memory blob under `session`
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SessionInUse`] if a download is open under the key.
    pub fn begin_unnamed(&mut self, session: SessionId, size: u64) -> Result<()> {
        self.check_begin(&session)?;
        self.blobs
            .insert(session, Blob::Unnamed(UnnamedBlob::new(size)));
        Ok(())
    }

    /// Register an opened download under `session`
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SessionInUse`] if a download is open under the key.
    pub fn begin_named(&mut self, session: SessionId, blob: NamedBlob) -> Result<()> {
        self.check_begin(&session)?;
        self.blobs.insert(session, Blob::Named(blob));
        Ok(())
    }

    /// Mutable access to an in-memory blob
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownSession`] or [`BridgeError::WrongBlobKind`].
    pub fn unnamed_mut(&mut self, session: &SessionId) -> Result<&mut UnnamedBlob> {
        match self.blobs.get_mut(session) {
            Some(Blob::Unnamed(blob)) => Ok(blob),
            Some(other) => Err(BridgeError::wrong_kind(
                session,
                BlobKind::Unnamed,
                other.kind(),
            )),
            None => Err(BridgeError::UnknownSession(session.clone())),
        }
    }

    /// Mutable access to an open download
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownSession`] or [`BridgeError::WrongBlobKind`].
    pub fn named_mut(&mut self, session: &SessionId) -> Result<&mut NamedBlob> {
        match self.blobs.get_mut(session) {
            Some(Blob::Named(blob)) => Ok(blob),
            Some(other) => Err(BridgeError::wrong_kind(
                session,
                BlobKind::Named,
                other.kind(),
            )),
            None => Err(BridgeError::UnknownSession(session.clone())),
        }
    }

    /// Remove an open download so its descriptor can be closed.
    ///
    /// An entry of the wrong kind is left in place.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownSession`] or [`BridgeError::WrongBlobKind`].
    pub fn take_named(&mut self, session: &SessionId) -> Result<NamedBlob> {
        match self.blobs.remove(session) {
            Some(Blob::Named(blob)) => Ok(blob),
            Some(other) => {
                let found = other.kind();
                self.blobs.insert(session.clone(), other);
                Err(BridgeError::wrong_kind(session, BlobKind::Named, found))
            }
            None => Err(BridgeError::UnknownSession(session.clone())),
        }
    }

    /// Close every open download and release every in-memory blob
    pub async fn close_all(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        for (session, blob) in self.blobs.drain() {
            match blob {
                Blob::Unnamed(_) => report.released_blobs += 1,
                Blob::Named(named) => {
                    let filename = named.filename().to_string();
                    let written = named.bytes_written();
                    tracing::warn!(
                        "Download {} (session {}) left incomplete after {} bytes",
                        filename,
                        session,
                        written
                    );
                    if let Err(e) = named.close().await {
                        tracing::warn!("Failed to close {}: {}", filename, e);
                        report.close_failures += 1;
                    }
                    report.incomplete_downloads.push(filename);
                }
            }
        }

        report
    }
}
