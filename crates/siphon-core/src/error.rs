//! Error types for the bridge engine
//!
//! Every error surfaced by a handler is fatal for the context that raised it:
//! the remote agent and the host no longer agree on blob state, so the drain
//! loop stops and the dump has to be retried from scratch by whoever owns the
//! context.
//!
//! # Error Categories
//!
//! - **Protocol faults**: the message stream broke an invariant of the blob
//!   protocol (unknown session, wrong blob kind, out-of-order chunk, ...)
//! - **Filesystem**: a local file or directory operation failed
//! - **Plumbing**: the channel or the drain task went away
//!
//! # Example
//!
//! ```no_run
//! use siphon_core::BridgeError;
//!
//! fn report(err: &BridgeError) {
//!     if err.is_protocol_fault() {
//!         eprintln!("remote side is out of sync: {err}");
//!     } else {
//!         eprintln!("dump aborted: {err}");
//!     }
//! }
//! ```

use crate::blob::{BlobKind, SessionId};
use crate::channel::ChannelError;
use std::borrow::Cow;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while processing bridge messages
#[derive(Debug, Error)]
pub enum BridgeError {
    // ============ Protocol Faults ============
    /// A data or end event named a session the store does not hold
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// The stored blob is of the other kind than the handler expects
    #[error("session {session} holds a {found} blob, expected {expected}")]
    WrongBlobKind {
        /// Session that was looked up
        session: SessionId,
        /// Kind the handler required
        expected: BlobKind,
        /// Kind actually stored
        found: BlobKind,
    },

    /// A chunk-copy data event skipped or repeated an index
    #[error("out-of-order chunk for session {session}: expected index {expected}, got {actual}")]
    OutOfOrderChunk {
        /// Session the chunk belongs to
        session: SessionId,
        /// Index the store would accept next
        expected: u64,
        /// Index carried by the event
        actual: u64,
    },

    /// A begin event reused the key of a download that is still open
    #[error("session {0} is still open")]
    SessionInUse(SessionId),

    /// A patch referenced a blob session that does not exist
    #[error("patch source blob not found: {0}")]
    BlobNotFound(SessionId),

    /// A patch carried neither a blob session nor a positive size
    #[error("patch for {filename} has neither a source blob nor a size")]
    PatchSourceMissing {
        /// Remote file the patch targeted
        filename: String,
    },

    /// A message with a known subject did not decode
    #[error("malformed {subject} message: {reason}")]
    Malformed {
        /// Subject of the message
        subject: Cow<'static, str>,
        /// Decoder diagnostic
        reason: String,
    },

    /// A remote path does not map under the output directory
    #[error("remote path {path} is outside base directory {basedir}")]
    PathOutsideBase {
        /// Offending remote path
        path: String,
        /// Base directory of the context
        basedir: PathBuf,
    },

    // ============ Filesystem ============
    /// Local file or directory operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Local path being operated on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    // ============ Plumbing ============
    /// The acknowledgement could not be posted
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The context stopped accepting messages
    #[error("bridge context {0} is closed")]
    ContextClosed(Cow<'static, str>),

    /// The drain task panicked or was cancelled
    #[error("task join error: {0}")]
    TaskJoin(Cow<'static, str>),
}

impl BridgeError {
    /// Returns true if the remote message stream broke the blob protocol
    #[must_use]
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            BridgeError::UnknownSession(_)
                | BridgeError::WrongBlobKind { .. }
                | BridgeError::OutOfOrderChunk { .. }
                | BridgeError::SessionInUse(_)
                | BridgeError::BlobNotFound(_)
                | BridgeError::PatchSourceMissing { .. }
                | BridgeError::Malformed { .. }
                | BridgeError::PathOutsideBase { .. }
        )
    }

    /// Returns true if a local filesystem operation failed
    #[must_use]
    pub fn is_filesystem(&self) -> bool {
        matches!(self, BridgeError::Io { .. })
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BridgeError::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a malformed-message error for a subject
    pub fn malformed(subject: &'static str, reason: impl ToString) -> Self {
        BridgeError::Malformed {
            subject: Cow::Borrowed(subject),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn wrong_kind(session: &SessionId, expected: BlobKind, found: BlobKind) -> Self {
        BridgeError::WrongBlobKind {
            session: session.clone(),
            expected,
            found,
        }
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_faults() {
        let session = SessionId::from("s1");
        assert!(BridgeError::UnknownSession(session.clone()).is_protocol_fault());
        assert!(BridgeError::wrong_kind(&session, BlobKind::Named, BlobKind::Unnamed).is_protocol_fault());
        assert!(
            BridgeError::OutOfOrderChunk {
                session: session.clone(),
                expected: 1,
                actual: 3,
            }
            .is_protocol_fault()
        );
        assert!(BridgeError::BlobNotFound(session).is_protocol_fault());
        assert!(BridgeError::malformed("memcpy", "missing field").is_protocol_fault());
    }

    #[test]
    fn test_filesystem_is_not_protocol_fault() {
        let err = BridgeError::io(
            "/tmp/out/bin",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_filesystem());
        assert!(!err.is_protocol_fault());
        assert!(err.to_string().contains("/tmp/out/bin"));
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::OutOfOrderChunk {
            session: SessionId::from("abc"),
            expected: 2,
            actual: 5,
        };
        let text = err.to_string();
        assert!(text.contains("abc"));
        assert!(text.contains("expected index 2"));
        assert!(text.contains("got 5"));

        let err = BridgeError::wrong_kind(&SessionId::from("x"), BlobKind::Named, BlobKind::Unnamed);
        assert_eq!(
            err.to_string(),
            "session x holds a unnamed blob, expected named"
        );
    }

    #[test]
    fn test_channel_conversion() {
        let err: BridgeError = ChannelError::Closed.into();
        assert!(matches!(err, BridgeError::Channel(_)));
        assert!(!err.is_protocol_fault());
    }
}
