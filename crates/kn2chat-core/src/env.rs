//! Environment abstraction for deterministic testing.
//!
//! Decouples chat logic from system resources (time, randomness). Production
//! code uses the real clock and OS entropy; tests plug in fixed clocks and
//! seeded byte streams.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
///   (handshake nonces are drawn from it)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Wall-clock time as seconds since the Unix epoch.
    ///
    /// Only used to stamp messages for display. Never used for ordering.
    fn wall_clock_secs(&self) -> u64;

    /// Generates a random `u64`.
    ///
    /// Convenience for session IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
