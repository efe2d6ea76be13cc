//! Bridge facade: attaches a processing context to a channel.
//!
//! ```text
//! channel callback ── BridgeHandle::deliver ──▶ queue ──▶ drain task ──▶ handlers
//!        ▲                                                    │
//!        └──────────────────── ack ◀─────────────────────────┘
//! ```

use crate::channel::Channel;
use crate::context::ProcessingContext;
use crate::dispatcher::{Dispatcher, Envelope};
use crate::error::{BridgeError, Result};
use crate::handler::Processor;
use crate::stats::BridgeStats;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Entry point for attaching contexts
pub struct Bridge;

impl Bridge {
    /// Start the drain task for `context`, posting acknowledgements on `channel`.
    ///
    /// Each call creates an independent blob store and queue; contexts share
    /// no state and may run concurrently.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use siphon_core::{Bridge, MemoryChannel, ProcessingContext};
    /// use serde_json::json;
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> Result<(), siphon_core::BridgeError> {
    /// let context = ProcessingContext::for_bundle("main", "/var/containers/Bundle/Application/X/Demo.app", "dump");
    /// let bridge = Bridge::attach(context, Arc::new(MemoryChannel::new()));
    ///
    /// bridge.deliver(json!({"type": "send", "payload": {"subject": "memcpy", "event": "begin", "session": "s", "size": 4}}), None)?;
    /// let stats = bridge.finish().await?;
    /// assert_eq!(stats.acks_sent, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn attach(context: ProcessingContext, channel: Arc<dyn Channel>) -> BridgeHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let label = context.label().to_string();
        let span = tracing::info_span!("bridge", context = %label);

        let dispatcher = Dispatcher::new(Processor::new(&context), channel, rx);
        let task = tokio::spawn(dispatcher.run().instrument(span));

        tracing::debug!(
            "Attached bridge {} ({} -> {})",
            label,
            context.basedir().display(),
            context.outdir().display()
        );

        BridgeHandle {
            deliverer: Deliverer { tx, label },
            task,
        }
    }
}

/// Cloneable delivery endpoint for a channel's message callback.
///
/// Delivery never blocks and may be called from any thread.
#[derive(Debug, Clone)]
pub struct Deliverer {
    tx: mpsc::UnboundedSender<Envelope>,
    label: String,
}

impl Deliverer {
    /// Queue a message and its optional binary payload
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ContextClosed`] if the context has shut down or aborted.
    pub fn deliver(&self, message: Value, data: Option<Vec<u8>>) -> Result<()> {
        self.enqueue(Envelope::Message { message, data })
    }

    /// Queue a message given as raw JSON text
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Malformed`] if `raw` is not JSON (nothing is
    /// queued), or [`BridgeError::ContextClosed`].
    pub fn deliver_json(&self, raw: &str, data: Option<Vec<u8>>) -> Result<()> {
        let message: Value =
            serde_json::from_str(raw).map_err(|e| BridgeError::malformed("envelope", e))?;
        self.deliver(message, data)
    }

    /// True once the context stopped accepting deliveries
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn enqueue(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| BridgeError::ContextClosed(self.label.clone().into()))
    }
}

/// Owner handle of an attached context
#[derive(Debug)]
pub struct BridgeHandle {
    deliverer: Deliverer,
    task: JoinHandle<Result<BridgeStats>>,
}

impl BridgeHandle {
    /// Context label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.deliverer.label
    }

    /// A delivery endpoint to hand to the channel callback
    #[must_use]
    pub fn deliverer(&self) -> Deliverer {
        self.deliverer.clone()
    }

    /// Queue a message; see [`Deliverer::deliver`]
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ContextClosed`] if the context has shut down or aborted.
    pub fn deliver(&self, message: Value, data: Option<Vec<u8>>) -> Result<()> {
        self.deliverer.deliver(message, data)
    }

    /// Wait until everything delivered before this call has been processed
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ContextClosed`] if the context aborted first.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.deliverer.enqueue(Envelope::Barrier(done_tx))?;
        done_rx
            .await
            .map_err(|_| BridgeError::ContextClosed(self.deliverer.label.clone().into()))
    }

    /// Process everything already queued, tear the context down and return its counters.
    ///
    /// Deliveries made after this call fail with [`BridgeError::ContextClosed`].
    ///
    /// # Errors
    ///
    /// Returns the fault that aborted the context, or [`BridgeError::TaskJoin`]
    /// if the drain task panicked.
    pub async fn finish(self) -> Result<BridgeStats> {
        // Already gone if the context aborted; the task result carries the fault
        let _ = self.deliverer.enqueue(Envelope::Shutdown);
        drop(self.deliverer);

        self.task
            .await
            .map_err(|e| BridgeError::TaskJoin(e.to_string().into()))?
    }
}
