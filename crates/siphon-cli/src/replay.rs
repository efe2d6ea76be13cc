//! Feeding a recorded transcript through the bridge.
//!
//! Every context of the transcript gets its own bridge and drain task; the
//! contexts run concurrently and share nothing but the output root.

use crate::progress::{ReplayProgress, format_bytes};
use crate::transcript::{ContextEvents, Transcript};
use siphon_core::{Bridge, BridgeError, BridgeStats, MemoryChannel, ProcessingContext};
use std::path::PathBuf;
use std::sync::Arc;

/// How replayed contexts map onto the local file system
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Remote base directory shared by every context
    pub basedir: String,
    /// Local output root
    pub output_root: PathBuf,
    /// Use `root/Payload/<bundle name>` instead of `root`
    pub bundle_layout: bool,
}

impl ReplayOptions {
    /// Processing context for the context labelled `label`
    #[must_use]
    pub fn context(&self, label: &str) -> ProcessingContext {
        if self.bundle_layout {
            ProcessingContext::for_bundle(label, &self.basedir, &self.output_root)
        } else {
            ProcessingContext::new(label, &self.basedir, &self.output_root)
        }
    }
}

/// Result of replaying one context
#[derive(Debug)]
pub struct ContextOutcome {
    /// Context label
    pub label: String,
    /// Local output directory of the context
    pub outdir: PathBuf,
    /// Counters, or the fault that aborted the context
    pub result: Result<BridgeStats, BridgeError>,
    /// Deliveries rejected because the context had already aborted
    pub undelivered: usize,
}

/// Replay every context of `transcript` concurrently and wait for all of them
///
/// # Errors
///
/// Returns an error only if a drain task could not be joined; per-context
/// faults are reported in the outcomes.
pub async fn replay(
    transcript: Transcript,
    options: &ReplayOptions,
    progress: &ReplayProgress,
) -> anyhow::Result<Vec<ContextOutcome>> {
    let mut tasks = Vec::with_capacity(transcript.contexts.len());

    for events in transcript.contexts {
        let context = options.context(&events.label);
        let progress = progress.clone();
        tasks.push(tokio::spawn(replay_context(context, events, progress)));
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        outcomes.push(task.await?);
    }
    Ok(outcomes)
}

async fn replay_context(
    context: ProcessingContext,
    recorded: ContextEvents,
    progress: ReplayProgress,
) -> ContextOutcome {
    let label = recorded.label.clone();
    let outdir = context.outdir().to_path_buf();
    let channel = Arc::new(MemoryChannel::new());
    let bridge = Bridge::attach(context, channel.clone());

    tracing::info!(
        "Replaying {} events ({} of payload) into context {}",
        recorded.events.len(),
        format_bytes(recorded.payload_bytes()),
        bridge.label()
    );

    let deliverer = bridge.deliverer();
    let mut undelivered = 0;
    for event in recorded.events {
        if deliverer.deliver(event.message, event.data).is_err() {
            undelivered += 1;
        }
        progress.inc();
    }
    drop(deliverer);

    let result = bridge.finish().await;
    tracing::debug!("Context {} posted {} acks", label, channel.ack_count());

    ContextOutcome {
        label,
        outdir,
        result,
        undelivered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;
    use tempfile::TempDir;

    const BASE: &str = "/var/containers/Bundle/Application/X/Demo.app";

    fn options(dir: &TempDir, bundle_layout: bool) -> ReplayOptions {
        ReplayOptions {
            basedir: BASE.to_string(),
            output_root: dir.path().to_path_buf(),
            bundle_layout,
        }
    }

    #[test]
    fn test_context_layouts() {
        let dir = TempDir::new().unwrap();

        let bundle = options(&dir, true).context("main");
        assert_eq!(bundle.outdir(), dir.path().join("Payload/Demo.app"));

        let flat = options(&dir, false).context("main");
        assert_eq!(flat.outdir(), dir.path());
    }

    #[tokio::test]
    async fn test_replay_download_and_fault() {
        let dir = TempDir::new().unwrap();
        let text = format!(
            concat!(
                r#"{{"context": "app", "message": {{"type": "send", "payload": {{"subject": "download", "event": "begin", "session": "1", "filename": "{base}/Info.plist"}}}}}}"#, "\n",
                r#"{{"context": "bad", "message": {{"type": "send", "payload": {{"subject": "download", "event": "data", "session": "9"}}}}, "data": "AA=="}}"#, "\n",
                r#"{{"context": "app", "message": {{"type": "send", "payload": {{"subject": "download", "event": "data", "session": "1"}}}}, "data": "PHBsaXN0Lz4="}}"#, "\n",
                r#"{{"context": "bad", "message": {{"type": "send", "payload": {{"subject": "noop"}}}}}}"#, "\n",
                r#"{{"context": "app", "message": {{"type": "send", "payload": {{"subject": "download", "event": "end", "session": "1"}}}}}}"#, "\n",
            ),
            base = BASE
        );
        let transcript = Transcript::parse(&text).unwrap();
        let progress = ReplayProgress::new(transcript.event_count() as u64, false);

        let outcomes = replay(transcript, &options(&dir, true), &progress)
            .await
            .unwrap();
        assert_eq!(progress.position(), 5);
        assert_eq!(outcomes.len(), 2);

        let app = &outcomes[0];
        assert_eq!(app.label, "app");
        let stats = app.result.as_ref().unwrap();
        assert_eq!(stats.files_completed, 1);
        assert_eq!(stats.acks_sent, 3);
        assert_eq!(
            std::fs::read(app.outdir.join("Info.plist")).unwrap(),
            b"<plist/>"
        );

        let bad = &outcomes[1];
        assert!(matches!(bad.result, Err(BridgeError::UnknownSession(_))));
    }
}
