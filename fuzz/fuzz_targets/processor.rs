//! Fuzz test for message processing
//!
//! Feeds a sequence of newline-separated JSON messages through one processor.
//! Faults are expected; panics are not.

#![no_main]

use libfuzzer_sys::fuzz_target;
use siphon_core::{ProcessingContext, Processor};

const BASE: &str = "/var/containers/Bundle/Application/F/Fuzz.app";

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(dir) = tempfile::TempDir::new() else {
        return;
    };
    let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
        return;
    };

    rt.block_on(async {
        let mut processor = Processor::new(&ProcessingContext::new("fuzz", BASE, dir.path()));
        for line in text.lines().take(64) {
            let Ok(message) = serde_json::from_str::<serde_json::Value>(line) else {
                continue;
            };
            // Binary payload is the message text itself
            let payload = Some(line.as_bytes().to_vec());
            if processor.process(&message, payload).await.is_err() {
                break;
            }
        }
        processor.teardown().await;
    });
});
