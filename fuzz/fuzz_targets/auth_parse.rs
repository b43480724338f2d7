//! Fuzz target for AuthRequest::parse
//!
//! Whatever a client sends as its `AUTH` line must be rejected or accepted
//! without panicking, and an accepted request must survive a trip through
//! its own wire form.

#![no_main]

use kn2chat_core::{AuthRequest, Challenge};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: ([u8; 32], &[u8])| {
    let (nonce, line) = input;
    let Ok(request) = AuthRequest::parse(line) else {
        return;
    };

    let reparsed = AuthRequest::parse(request.to_line().as_bytes());
    assert_eq!(reparsed.as_ref().ok(), Some(&request));

    // Forging a signature over a fresh nonce is out of reach for the fuzzer.
    let challenge = Challenge::from_nonce(nonce);
    assert!(challenge.verified_key(&request).is_none());
});
