//! Recorded channel traffic.
//!
//! A transcript is JSON Lines, one delivery per line:
//!
//! ```text
//! {"context": "main", "message": {"type": "send", "payload": {...}}, "data": "<base64>"}
//! ```
//!
//! `context` defaults to [`DEFAULT_CONTEXT`] and `data` may be absent or
//! null. Blank lines and lines starting with `#` are skipped.

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Context label used when a line names none
pub const DEFAULT_CONTEXT: &str = "main";

#[derive(Debug, Deserialize)]
struct Line {
    #[serde(default)]
    context: Option<String>,
    message: Value,
    #[serde(default)]
    data: Option<String>,
}

/// One recorded delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Message body
    pub message: Value,
    /// Decoded binary payload
    pub data: Option<Vec<u8>>,
}

/// Deliveries of one context, in recorded order
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEvents {
    /// Context label
    pub label: String,
    /// Recorded deliveries
    pub events: Vec<Event>,
}

impl ContextEvents {
    /// Total binary payload bytes
    #[must_use]
    pub fn payload_bytes(&self) -> u64 {
        self.events
            .iter()
            .filter_map(|e| e.data.as_ref())
            .map(|d| d.len() as u64)
            .sum()
    }
}

/// A parsed transcript, grouped by context in order of first appearance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    /// Per-context deliveries
    pub contexts: Vec<ContextEvents>,
}

impl Transcript {
    /// Parse transcript text
    ///
    /// # Errors
    ///
    /// Returns an error naming the line number of the first malformed line.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut transcript = Self::default();

        for (number, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (label, event) =
                parse_line(trimmed).with_context(|| format!("transcript line {}", number + 1))?;
            transcript.push(label, event);
        }

        Ok(transcript)
    }

    /// Read and parse a transcript file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line is malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading transcript {}", path.display()))?;
        Self::parse(&text)
    }

    /// Total number of deliveries
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.contexts.iter().map(|c| c.events.len()).sum()
    }

    fn push(&mut self, label: String, event: Event) {
        match self.contexts.iter_mut().find(|c| c.label == label) {
            Some(context) => context.events.push(event),
            None => self.contexts.push(ContextEvents {
                label,
                events: vec![event],
            }),
        }
    }
}

fn parse_line(line: &str) -> anyhow::Result<(String, Event)> {
    let line: Line = serde_json::from_str(line)?;
    let data = line
        .data
        .map(|encoded| STANDARD.decode(encoded.as_bytes()))
        .transpose()
        .context("invalid base64 in data")?;

    let label = line
        .context
        .unwrap_or_else(|| DEFAULT_CONTEXT.to_string());

    Ok((
        label,
        Event {
            message: line.message,
            data,
        },
    ))
}
