//! Fuzz test for agent message decoding
//!
//! Tests that arbitrary JSON input doesn't cause panics when classified as a
//! channel message and decoded as a request payload.

#![no_main]

use libfuzzer_sys::fuzz_target;
use siphon_core::message::{Message, Request};

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Message::Send { payload } = Message::from_value(&value) {
            if let Ok(request) = Request::from_payload(&payload) {
                let _ = request.subject();
            }
        }

        // Payloads may also arrive unwrapped
        let _ = Request::from_payload(&value);
    }
});
