//! Serializing dispatcher.
//!
//! The channel may invoke its delivery callback from any thread, reentrantly
//! and concurrently. Every delivery is pushed onto one FIFO queue and a single
//! drain task per context pops them one at a time, awaiting each handler to
//! completion before touching the next envelope. That gives arrival-order,
//! never-overlapping processing without locking the blob store.
//!
//! After each handled `send` message the drain posts a one-byte ack. The agent
//! holds its next send until the ack arrives, so at most one binary payload is
//! in flight per context.
//!
//! A handler fault stops the drain: the queue is closed, no ack is posted for
//! the faulting message, the store is torn down and the fault is returned to
//! whoever awaits the drain task.

use crate::channel::Channel;
use crate::error::Result;
use crate::handler::Processor;
use crate::message::{ACK_PAYLOAD, ack_message};
use crate::stats::BridgeStats;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Queue item
#[derive(Debug)]
pub(crate) enum Envelope {
    /// A delivery from the channel
    Message {
        message: Value,
        data: Option<Vec<u8>>,
    },
    /// Completed once every earlier envelope has been processed
    Barrier(oneshot::Sender<()>),
    /// Stop accepting deliveries, drain what is queued, then exit
    Shutdown,
}

/// Single consumer of a context's delivery queue
pub(crate) struct Dispatcher {
    processor: Processor,
    channel: Arc<dyn Channel>,
    queue: mpsc::UnboundedReceiver<Envelope>,
}

impl Dispatcher {
    pub(crate) fn new(
        processor: Processor,
        channel: Arc<dyn Channel>,
        queue: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self {
            processor,
            channel,
            queue,
        }
    }

    /// Drain until shutdown or fault, then tear the store down
    pub(crate) async fn run(mut self) -> Result<BridgeStats> {
        tracing::debug!("Drain loop started for {}", self.processor.label());

        let outcome = self.drain().await;
        if outcome.is_err() {
            self.queue.close();
        }

        let report = self.processor.teardown().await;
        let stats = self.processor.stats().clone();

        match outcome {
            Ok(()) => {
                tracing::info!(
                    "Context {} finished: {} messages, {} files, {} patches, {} bytes downloaded",
                    self.processor.label(),
                    stats.messages_handled,
                    stats.files_completed,
                    stats.patches_applied,
                    stats.bytes_downloaded
                );
                if !report.incomplete_downloads.is_empty() {
                    tracing::warn!(
                        "Context {} closed with {} incomplete downloads",
                        self.processor.label(),
                        report.incomplete_downloads.len()
                    );
                }
                Ok(stats)
            }
            Err(e) => {
                tracing::error!("Context {} aborted: {}", self.processor.label(), e);
                Err(e)
            }
        }
    }

    async fn drain(&mut self) -> Result<()> {
        while let Some(envelope) = self.queue.recv().await {
            match envelope {
                Envelope::Message { message, data } => {
                    let disposition = self.processor.process(&message, data).await?;
                    if disposition.needs_ack() {
                        self.channel.post(&ack_message(), Some(&ACK_PAYLOAD[..])).await?;
                        self.processor.stats_mut().acks_sent += 1;
                    }
                }
                Envelope::Barrier(done) => {
                    let _ = done.send(());
                }
                Envelope::Shutdown => {
                    tracing::debug!("Shutdown requested for {}", self.processor.label());
                    self.queue.close();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::context::ProcessingContext;
    use serde_json::json;
    use tempfile::TempDir;

    fn spawn(
        dir: &TempDir,
        channel: Arc<MemoryChannel>,
    ) -> (
        mpsc::UnboundedSender<Envelope>,
        tokio::task::JoinHandle<Result<BridgeStats>>,
    ) {
        let context = ProcessingContext::new("test", "/base", dir.path());
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(Processor::new(&context), channel, rx);
        (tx, tokio::spawn(dispatcher.run()))
    }

    fn send(payload: Value) -> Envelope {
        Envelope::Message {
            message: json!({"type": "send", "payload": payload}),
            data: None,
        }
    }

    #[tokio::test]
    async fn test_acks_follow_send_messages() {
        let dir = TempDir::new().unwrap();
        let channel = Arc::new(MemoryChannel::new());
        let (tx, task) = spawn(&dir, Arc::clone(&channel));

        tx.send(send(json!({"subject": "memcpy", "event": "begin", "session": "m", "size": 0})))
            .unwrap();
        tx.send(send(json!({"subject": "unknown"}))).unwrap();
        tx.send(Envelope::Message {
            message: json!({"type": "error", "description": "x"}),
            data: None,
        })
        .unwrap();
        tx.send(Envelope::Shutdown).unwrap();

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.acks_sent, 2);
        assert_eq!(channel.ack_count(), 2);
        assert!(channel.posted().iter().all(|p| p.data.as_deref() == Some(&ACK_PAYLOAD[..])));
    }

    #[tokio::test]
    async fn test_barrier_waits_for_earlier_messages() {
        let dir = TempDir::new().unwrap();
        let channel = Arc::new(MemoryChannel::new());
        let (tx, task) = spawn(&dir, Arc::clone(&channel));

        for i in 0..10 {
            tx.send(send(json!({"subject": "noop", "n": i}))).unwrap();
        }
        let (done_tx, done_rx) = oneshot::channel();
        tx.send(Envelope::Barrier(done_tx)).unwrap();
        done_rx.await.unwrap();
        assert_eq!(channel.ack_count(), 10);

        drop(tx);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_fault_stops_drain_without_ack() {
        let dir = TempDir::new().unwrap();
        let channel = Arc::new(MemoryChannel::new());
        let (tx, task) = spawn(&dir, Arc::clone(&channel));

        tx.send(send(json!({"subject": "memcpy", "event": "data", "session": "none", "index": 1})))
            .unwrap();
        tx.send(send(json!({"subject": "noop"}))).unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_protocol_fault());
        assert_eq!(channel.ack_count(), 0);
        assert!(tx.send(send(json!({"subject": "noop"}))).is_err());
    }

    #[tokio::test]
    async fn test_closed_channel_aborts() {
        let dir = TempDir::new().unwrap();
        let channel = Arc::new(MemoryChannel::new());
        channel.close();
        let (tx, task) = spawn(&dir, Arc::clone(&channel));

        tx.send(send(json!({"subject": "noop"}))).unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, crate::BridgeError::Channel(_)));
    }
}
