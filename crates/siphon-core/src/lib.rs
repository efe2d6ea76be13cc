//! # siphon core
//!
//! Host side of an instrumentation bridge that pulls files and memory out
//! of a remote process and rebuilds them on local disk.
//!
//! An injected agent sends `(message, optional binary)` events over an
//! instrumentation channel. This crate provides:
//! - A per-context blob store keyed by agent session identifiers
//! - Chunk-copy reassembly of in-memory buffers
//! - Streaming downloads mirrored under a local output directory
//! - Offset patches sourced from reassembled blobs or zero-fill
//! - A serializing dispatcher that processes events strictly in arrival
//!   order and acknowledges each one with a single byte
//!
//! ## Example
//!
//! ```no_run
//! use siphon_core::{Bridge, MemoryChannel, ProcessingContext};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> siphon_core::Result<()> {
//! let context = ProcessingContext::new("main", "/private/var/app", "out");
//! let bridge = Bridge::attach(context, Arc::new(MemoryChannel::new()));
//!
//! let deliverer = bridge.deliverer();
//! deliverer.deliver(
//!     json!({"type": "send", "payload": {
//!         "subject": "download", "event": "begin", "session": "1",
//!         "filename": "/private/var/app/Info.plist", "stat": {"mode": 420}
//!     }}),
//!     None,
//! )?;
//! deliverer.deliver(
//!     json!({"type": "send", "payload": {"subject": "download", "event": "data", "session": "1"}}),
//!     Some(b"<plist/>".to_vec()),
//! )?;
//! deliverer.deliver(
//!     json!({"type": "send", "payload": {"subject": "download", "event": "end", "session": "1"}}),
//!     None,
//! )?;
//!
//! let stats = bridge.finish().await?;
//! assert_eq!(stats.files_completed, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod bridge;
pub mod channel;
pub mod context;
mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod path;
pub mod stats;

pub use blob::{BlobKind, BlobStore, SessionId, TeardownReport};
pub use bridge::{Bridge, BridgeHandle, Deliverer};
pub use channel::{Channel, ChannelError, MemoryChannel};
pub use context::ProcessingContext;
pub use error::{BridgeError, Result};
pub use handler::{Disposition, Processor};
pub use message::{ACK_PAYLOAD, Message, Request};
pub use path::PathResolver;
pub use stats::BridgeStats;
