//! Per-context counters.

use serde::Serialize;

/// Counters collected by one context's drain loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// `send` messages handled successfully
    pub messages_handled: u64,
    /// Acknowledgements posted
    pub acks_sent: u64,
    /// `send` messages whose subject or event no handler knows
    pub ignored: u64,
    /// Error notifications raised by the agent
    pub remote_errors: u64,
    /// Chunk-copy chunks accepted
    pub chunks_received: u64,
    /// Bytes written by downloads
    pub bytes_downloaded: u64,
    /// Downloads closed by an end event
    pub files_completed: u64,
    /// Patches applied
    pub patches_applied: u64,
    /// Bytes written by patches
    pub bytes_patched: u64,
    /// Downloads still open when the context was torn down
    pub incomplete_downloads: u64,
}

impl BridgeStats {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted chunk
    pub fn record_chunk(&mut self) {
        self.chunks_received += 1;
    }

    /// Record download bytes written
    pub fn record_download_bytes(&mut self, bytes: usize) {
        self.bytes_downloaded += bytes as u64;
    }

    /// Record a completed download
    pub fn record_file_completed(&mut self) {
        self.files_completed += 1;
    }

    /// Record an applied patch
    pub fn record_patch(&mut self, bytes: u64) {
        self.patches_applied += 1;
        self.bytes_patched += bytes;
    }
}
