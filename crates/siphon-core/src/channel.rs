//! Instrumentation channel abstraction.
//!
//! The bridge only needs one thing from the channel it is attached to: a way
//! to post replies back to the injected agent. Inbound delivery goes the other
//! way, through [`crate::bridge::BridgeHandle::deliver`], which the channel's
//! message callback calls for every event.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel was closed by either side
    #[error("channel is closed")]
    Closed,
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Reply path to the injected agent.
///
/// # Examples
///
/// ```no_run
/// use siphon_core::channel::{Channel, MemoryChannel};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let channel = MemoryChannel::new();
/// channel.post(&json!({"type": "ack"}), Some(&[0u8][..])).await?;
/// assert_eq!(channel.ack_count(), 1);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Channel: Send + Sync {
    /// Post a JSON message with an optional binary payload.
    ///
    /// # Errors
    /// Returns `ChannelError` if the message cannot be delivered
    async fn post(&self, message: &Value, data: Option<&[u8]>) -> ChannelResult<()>;

    /// Check if the channel is closed.
    fn is_closed(&self) -> bool {
        false
    }
}

/// A message posted through a [`MemoryChannel`]
#[derive(Debug, Clone, PartialEq)]
pub struct Posted {
    /// JSON body
    pub message: Value,
    /// Binary payload, if any
    pub data: Option<Vec<u8>>,
}

/// In-process channel that records every posted reply
#[derive(Debug, Default)]
pub struct MemoryChannel {
    posted: Mutex<Vec<Posted>>,
    closed: AtomicBool,
}

impl MemoryChannel {
    /// Create an open channel with no recorded posts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later post fail with [`ChannelError::Closed`]
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the recorded posts
    #[must_use]
    pub fn posted(&self) -> Vec<Posted> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded `{"type": "ack"}` posts
    #[must_use]
    pub fn ack_count(&self) -> usize {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.message.get("type").and_then(Value::as_str) == Some("ack"))
            .count()
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn post(&self, message: &Value, data: Option<&[u8]>) -> ChannelResult<()> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Posted {
                message: message.clone(),
                data: data.map(<[u8]>::to_vec),
            });
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
