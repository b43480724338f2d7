//! Fuzz target for KeyDecoder
//!
//! Arbitrary terminal input, in arbitrary chunks. Never panics, never
//! yields a control character as text, and a flush always settles any
//! pending escape.

#![no_main]

use kn2chat_core::{KeyDecoder, KeyInput};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|chunks: Vec<Vec<u8>>| {
    let mut decoder = KeyDecoder::new();
    for chunk in &chunks {
        for key in decoder.decode(chunk) {
            if let KeyInput::Char(c) = key {
                assert!(!c.is_control(), "control char {c:?} decoded as text");
            }
        }
    }
    let _ = decoder.flush();
    assert!(!decoder.has_pending_escape());
});
