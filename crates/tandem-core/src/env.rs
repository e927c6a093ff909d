//! Environment abstraction.
//!
//! Everything the protocol needs from the outside world that is not a channel:
//! the clock, sleeping, and randomness. Production uses [`SystemEnv`]; the
//! simulation harness supplies a seeded implementation so runs replay
//! bit-for-bit.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use rand::RngCore;

/// Clock, timers, and randomness.
///
/// Implementations must be cheap to clone; clones share the same clock and
/// random stream.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current time.
    fn now(&self) -> Instant;

    /// Sleep for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Uniformly random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    /// Uniformly random value in `0..bound`. Returns 0 when `bound` is 0.
    fn random_below(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }

        // Rejection sampling keeps the draw unbiased for any bound.
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let value = self.random_u64();
            if value < zone {
                return value % bound;
            }
        }
    }

    /// Uniformly random duration in `min..=max`, at millisecond granularity.
    fn random_duration(&self, min: Duration, max: Duration) -> Duration {
        let (min_ms, max_ms) = (min.as_millis() as u64, max.as_millis() as u64);
        if max_ms <= min_ms {
            return min;
        }
        Duration::from_millis(min_ms + self.random_below(max_ms - min_ms + 1))
    }
}

/// Production environment: wall clock, tokio timers, OS-seeded randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}

/// Random string over `[0-9a-z]` of length `len`.
pub fn random_base36<E: Environment>(env: &E, len: usize) -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    (0..len).map(|_| char::from(ALPHABET[env.random_below(36) as usize])).collect()
}
