//! Fuzz target for TelnetDecoder
//!
//! Feeds arbitrary bytes split at an arbitrary point. The decoder must never
//! panic, and the split must not change what comes out.

#![no_main]

use kn2chat_core::TelnetDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u16, &[u8])| {
    let (split, data) = input;
    let split = usize::from(split) % (data.len() + 1);

    let whole = TelnetDecoder::new().decode(data);

    let mut decoder = TelnetDecoder::new();
    let mut parts = decoder.decode(&data[..split]);
    let rest = decoder.decode(&data[split..]);
    parts.data.extend(rest.data);
    parts.replies.extend(rest.replies);
    parts.resizes.extend(rest.resizes);

    assert_eq!(whole, parts);
    assert!(whole.data.len() <= data.len());
});
