//! Channel message shapes.
//!
//! The agent talks JSON. Every event is an envelope
//! `{"type": "send" | "error" | ..., "payload": {...}}`; only `send` envelopes
//! carry bridge requests, discriminated by `payload.subject`:
//!
//! | subject    | fields                                              |
//! |------------|-----------------------------------------------------|
//! | `memcpy`   | `event` (begin/data), `session`, `size`, `index`    |
//! | `download` | `event` (begin/data/end), `session`, `stat.mode`, `filename` |
//! | `patch`    | `offset`, `blob` (optional), `size`, `filename`     |

use crate::blob::SessionId;
use crate::error::{BridgeError, Result};
use serde::Deserialize;
use serde_json::{Value, json};

/// Subject of chunk-copy requests
pub const SUBJECT_MEMCPY: &str = "memcpy";
/// Subject of download requests
pub const SUBJECT_DOWNLOAD: &str = "download";
/// Subject of patch requests
pub const SUBJECT_PATCH: &str = "patch";

/// Payload sent along with every acknowledgement
pub const ACK_PAYLOAD: [u8; 1] = [0];

/// Permission bits used when a download does not announce its mode
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Body of the acknowledgement posted after each handled request
#[must_use]
pub fn ack_message() -> Value {
    json!({ "type": "ack" })
}

/// Top-level message envelope
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Application message from the agent
    Send {
        /// Request body
        #[serde(default)]
        payload: Value,
    },
    /// Script error raised inside the agent
    Error {
        /// Error text
        #[serde(default)]
        description: Option<Value>,
        /// JavaScript stack, when available
        #[serde(default)]
        stack: Option<Value>,
    },
    /// Any other message type
    #[serde(other)]
    Other,
}

impl Message {
    /// Decode an envelope; anything that is not a recognisable envelope is [`Message::Other`]
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Message::deserialize(value).unwrap_or(Message::Other)
    }
}

/// Render an error notification field; strings print without quotes
#[must_use]
pub fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Chunk-copy event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MemcpyEvent {
    /// Start an in-memory blob
    Begin {
        /// Blob session
        session: SessionId,
        /// Announced size in bytes
        #[serde(default)]
        size: u64,
    },
    /// One chunk of the blob; the bytes travel as the binary payload
    Data {
        /// Blob session
        session: SessionId,
        /// 1-based chunk index
        index: u64,
    },
    /// Unrecognised event
    #[serde(other)]
    Other,
}

/// File metadata announced with a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RemoteStat {
    /// `st_mode` of the remote file
    #[serde(default = "default_mode")]
    pub mode: u32,
}

impl RemoteStat {
    /// Permission bits of the announced mode
    #[must_use]
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

impl Default for RemoteStat {
    fn default() -> Self {
        Self { mode: default_mode() }
    }
}

fn default_mode() -> u32 {
    DEFAULT_FILE_MODE
}

/// Download event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum DownloadEvent {
    /// Open the destination file
    Begin {
        /// Blob session
        session: SessionId,
        /// Remote absolute path
        filename: String,
        /// Remote metadata
        #[serde(default)]
        stat: RemoteStat,
    },
    /// Next slice of the file; the bytes travel as the binary payload
    Data {
        /// Blob session
        session: SessionId,
    },
    /// Close the destination file
    End {
        /// Blob session
        session: SessionId,
    },
    /// Unrecognised event
    #[serde(other)]
    Other,
}

/// Offset write into a previously downloaded file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatchRequest {
    /// Remote absolute path of the target file
    pub filename: String,
    /// Byte offset of the write
    pub offset: u64,
    /// Session of an in-memory blob holding the bytes
    #[serde(default)]
    pub blob: Option<SessionId>,
    /// Length of a zero-filled region, used when no blob is named
    #[serde(default)]
    pub size: Option<u64>,
}

/// Where the bytes of a patch come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchSource {
    /// Concatenated chunks of an in-memory blob
    Blob(SessionId),
    /// A run of zero bytes
    Zeroes(u64),
}

impl PatchRequest {
    /// Resolve the source of the patch; `None` if neither a blob nor a positive size is given
    #[must_use]
    pub fn source(&self) -> Option<PatchSource> {
        match (&self.blob, self.size) {
            (Some(session), _) => Some(PatchSource::Blob(session.clone())),
            (None, Some(size)) if size > 0 => Some(PatchSource::Zeroes(size)),
            _ => None,
        }
    }
}

/// A `send` payload classified by subject
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Chunk-copy request
    Memcpy(MemcpyEvent),
    /// Download request
    Download(DownloadEvent),
    /// Patch request
    Patch(PatchRequest),
    /// Subject no handler knows (empty if absent)
    Unknown(String),
}

impl Request {
    /// Classify a `send` payload by its subject and decode its fields
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Malformed`] if a known subject's fields do not decode.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let subject = payload
            .get("subject")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match subject {
            SUBJECT_MEMCPY => MemcpyEvent::deserialize(payload)
                .map(Request::Memcpy)
                .map_err(|e| BridgeError::malformed(SUBJECT_MEMCPY, e)),
            SUBJECT_DOWNLOAD => DownloadEvent::deserialize(payload)
                .map(Request::Download)
                .map_err(|e| BridgeError::malformed(SUBJECT_DOWNLOAD, e)),
            SUBJECT_PATCH => PatchRequest::deserialize(payload)
                .map(Request::Patch)
                .map_err(|e| BridgeError::malformed(SUBJECT_PATCH, e)),
            other => Ok(Request::Unknown(other.to_string())),
        }
    }

    /// Subject string of this request
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Request::Memcpy(_) => SUBJECT_MEMCPY,
            Request::Download(_) => SUBJECT_DOWNLOAD,
            Request::Patch(_) => SUBJECT_PATCH,
            Request::Unknown(subject) => subject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_types() {
        let send = Message::from_value(&json!({"type": "send", "payload": {"subject": "x"}}));
        assert!(matches!(send, Message::Send { .. }));

        let error = Message::from_value(&json!({
            "type": "error",
            "description": "ReferenceError: x is not defined",
            "stack": "at foo",
            "fileName": "agent.js",
            "lineNumber": 3
        }));
        assert_eq!(
            error,
            Message::Error {
                description: Some(json!("ReferenceError: x is not defined")),
                stack: Some(json!("at foo")),
            }
        );

        assert_eq!(Message::from_value(&json!({"type": "log", "level": "info"})), Message::Other);
        assert_eq!(Message::from_value(&json!({"no": "type"})), Message::Other);
        assert_eq!(Message::from_value(&json!("string")), Message::Other);
    }

    #[test]
    fn test_error_fields_of_any_shape() {
        let error = Message::from_value(&json!({"type": "error", "description": 42, "stack": null}));
        let Message::Error { description, stack } = error else {
            panic!("expected an error envelope");
        };
        assert_eq!(field_text(description.as_ref()).as_deref(), Some("42"));
        assert_eq!(field_text(stack.as_ref()), None);

        assert_eq!(field_text(Some(&json!("boom"))).as_deref(), Some("boom"));
        assert_eq!(field_text(None), None);
    }

    #[test]
    fn test_memcpy_events() {
        let begin = Request::from_payload(&json!({
            "subject": "memcpy", "event": "begin", "session": "s1", "size": 32
        }))
        .unwrap();
        assert_eq!(
            begin,
            Request::Memcpy(MemcpyEvent::Begin {
                session: SessionId::from("s1"),
                size: 32
            })
        );

        let data = Request::from_payload(&json!({
            "subject": "memcpy", "event": "data", "session": "s1", "index": 1
        }))
        .unwrap();
        assert_eq!(
            data,
            Request::Memcpy(MemcpyEvent::Data {
                session: SessionId::from("s1"),
                index: 1
            })
        );

        let other = Request::from_payload(&json!({"subject": "memcpy", "event": "flush"})).unwrap();
        assert_eq!(other, Request::Memcpy(MemcpyEvent::Other));
    }

    #[test]
    fn test_download_begin_mode() {
        let req = Request::from_payload(&json!({
            "subject": "download",
            "event": "begin",
            "session": "d1",
            "filename": "/var/app/App.app/App",
            "stat": {"mode": 0o100755, "size": 1024}
        }))
        .unwrap();

        match req {
            Request::Download(DownloadEvent::Begin { stat, filename, .. }) => {
                assert_eq!(filename, "/var/app/App.app/App");
                assert_eq!(stat.permissions(), 0o755);
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let req = Request::from_payload(&json!({
            "subject": "download", "event": "begin", "session": "d2", "filename": "/a"
        }))
        .unwrap();
        assert!(matches!(
            req,
            Request::Download(DownloadEvent::Begin { stat, .. }) if stat.permissions() == DEFAULT_FILE_MODE
        ));
    }

    #[test]
    fn test_patch_source() {
        let with_blob: PatchRequest = serde_json::from_value(json!({
            "filename": "/a", "offset": 16, "blob": "m1", "size": 4
        }))
        .unwrap();
        assert_eq!(with_blob.source(), Some(PatchSource::Blob(SessionId::from("m1"))));

        let zeroes: PatchRequest = serde_json::from_value(json!({
            "filename": "/a", "offset": 16, "blob": null, "size": 4
        }))
        .unwrap();
        assert_eq!(zeroes.source(), Some(PatchSource::Zeroes(4)));

        let zero_size: PatchRequest =
            serde_json::from_value(json!({"filename": "/a", "offset": 0, "size": 0})).unwrap();
        assert_eq!(zero_size.source(), None);

        let neither: PatchRequest =
            serde_json::from_value(json!({"filename": "/a", "offset": 0})).unwrap();
        assert_eq!(neither.source(), None);
    }

    #[test]
    fn test_unknown_and_malformed() {
        assert_eq!(
            Request::from_payload(&json!({"subject": "progress", "done": 3})).unwrap(),
            Request::Unknown("progress".to_string())
        );
        assert_eq!(
            Request::from_payload(&json!({"value": 1})).unwrap(),
            Request::Unknown(String::new())
        );

        let err = Request::from_payload(&json!({"subject": "memcpy", "event": "data"})).unwrap_err();
        assert!(matches!(err, BridgeError::Malformed { .. }));

        let err = Request::from_payload(&json!({"subject": "patch", "filename": "/a"})).unwrap_err();
        assert!(err.is_protocol_fault());
    }

    #[test]
    fn test_ack_message() {
        assert_eq!(ack_message(), json!({"type": "ack"}));
        assert_eq!(ACK_PAYLOAD.len(), 1);
    }
}
