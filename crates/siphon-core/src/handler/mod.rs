//! Message routing for one processing context.
//!
//! # Message Flow
//!
//! ```text
//! envelope → Message::from_value ─┬→ send  → Request::from_payload ─┬→ memcpy   → BlobStore
//!                                 │                                 ├→ download → BlobStore + file
//!                                 │                                 ├→ patch    → file
//!                                 │                                 └→ unknown  → ignored
//!                                 ├→ error → logged
//!                                 └→ other → skipped
//! ```

pub mod download;
pub mod memcpy;
pub mod patch;

pub use download::handle_download;
pub use memcpy::handle_memcpy;
pub use patch::handle_patch;

use crate::blob::{BlobStore, TeardownReport};
use crate::context::ProcessingContext;
use crate::error::Result;
use crate::message::{DownloadEvent, MemcpyEvent, Message, Request, field_text};
use crate::path::PathResolver;
use crate::stats::BridgeStats;
use serde_json::Value;

/// What became of a processed envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// A `send` message was handled (or knowingly ignored) and must be acknowledged
    Handled,
    /// The agent reported a script error
    RemoteError,
    /// Not a `send` message
    Skipped,
}

impl Disposition {
    /// True if the agent waits for an acknowledgement of this message
    #[must_use]
    pub fn needs_ack(&self) -> bool {
        matches!(self, Disposition::Handled)
    }
}

/// Owns the blob store of one context and routes messages to the handlers
#[derive(Debug)]
pub struct Processor {
    label: String,
    resolver: PathResolver,
    store: BlobStore,
    stats: BridgeStats,
}

impl Processor {
    /// Create a processor with an empty store
    #[must_use]
    pub fn new(context: &ProcessingContext) -> Self {
        Self {
            label: context.label().to_string(),
            resolver: context.resolver(),
            store: BlobStore::new(),
            stats: BridgeStats::new(),
        }
    }

    /// Context label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The blob store
    #[must_use]
    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut BridgeStats {
        &mut self.stats
    }

    /// Process one envelope and its optional binary payload to completion
    ///
    /// # Errors
    ///
    /// Returns the handler's error; the context must be torn down afterwards.
    pub async fn process(&mut self, message: &Value, data: Option<Vec<u8>>) -> Result<Disposition> {
        match Message::from_value(message) {
            Message::Send { payload } => {
                let request = Request::from_payload(&payload)?;
                self.route(request, data).await?;
                self.stats.messages_handled += 1;
                Ok(Disposition::Handled)
            }
            Message::Error { description, stack } => {
                self.stats.remote_errors += 1;
                tracing::warn!(
                    "Agent error in {}: {} {}",
                    self.label,
                    field_text(description.as_ref())
                        .unwrap_or_else(|| "(no description)".to_string()),
                    field_text(stack.as_ref()).unwrap_or_default()
                );
                Ok(Disposition::RemoteError)
            }
            Message::Other => {
                tracing::debug!("Skipping non-send message: {}", message);
                Ok(Disposition::Skipped)
            }
        }
    }

    async fn route(&mut self, request: Request, data: Option<Vec<u8>>) -> Result<()> {
        match request {
            Request::Memcpy(event) => {
                let counts = match &event {
                    MemcpyEvent::Data { .. } => data.is_some(),
                    MemcpyEvent::Other => {
                        self.stats.ignored += 1;
                        false
                    }
                    MemcpyEvent::Begin { .. } => false,
                };
                handle_memcpy(&mut self.store, event, data)?;
                if counts {
                    self.stats.record_chunk();
                }
            }
            Request::Download(event) => {
                let written = match (&event, &data) {
                    (DownloadEvent::Data { .. }, Some(bytes)) => bytes.len(),
                    _ => 0,
                };
                let ends = matches!(event, DownloadEvent::End { .. });
                if matches!(event, DownloadEvent::Other) {
                    self.stats.ignored += 1;
                }

                handle_download(&self.resolver, &mut self.store, event, data).await?;

                self.stats.record_download_bytes(written);
                if ends {
                    self.stats.record_file_completed();
                }
            }
            Request::Patch(request) => {
                let written = handle_patch(&self.resolver, &self.store, &request).await?;
                self.stats.record_patch(written);
            }
            Request::Unknown(subject) => {
                tracing::debug!("Ignoring message with unknown subject {:?}", subject);
                self.stats.ignored += 1;
            }
        }
        Ok(())
    }

    /// Close open downloads and release every blob
    pub async fn teardown(&mut self) -> TeardownReport {
        let report = self.store.close_all().await;
        self.stats.incomplete_downloads += report.incomplete_downloads.len() as u64;
        report
    }
}
