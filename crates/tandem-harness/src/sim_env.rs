//! Seeded simulation environment.
//!
//! All randomness comes from one `ChaCha8Rng` shared by every clone, so a
//! seed reproduces room codes, addresses, card draws and reconnect jitter.
//! Time is either tokio's clock (pausable in tests) or a virtual clock
//! advanced by the [`crate::scenario::World`].

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tandem_core::Environment;

/// Deterministic [`Environment`].
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    clock: Clock,
}

#[derive(Clone)]
enum Clock {
    Tokio,
    Virtual { origin: Instant, elapsed: Arc<Mutex<Duration>> },
}

impl SimEnv {
    /// Environment on tokio's clock.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))), clock: Clock::Tokio }
    }

    /// Environment on a virtual clock that only moves through
    /// [`SimEnv::advance`].
    pub fn with_virtual_clock(seed: u64) -> Self {
        Self {
            clock: Clock::Virtual {
                origin: Instant::now(),
                elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            },
            ..Self::with_seed(seed)
        }
    }

    /// Move the virtual clock forward. No-op on tokio's clock.
    pub fn advance(&self, by: Duration) {
        if let Clock::Virtual { elapsed, .. } = &self.clock {
            *elapsed.lock().unwrap_or_else(PoisonError::into_inner) += by;
        }
    }

    /// Time since the virtual clock started, zero on tokio's clock.
    pub fn elapsed(&self) -> Duration {
        match &self.clock {
            Clock::Virtual { elapsed, .. } => {
                *elapsed.lock().unwrap_or_else(PoisonError::into_inner)
            },
            Clock::Tokio => Duration::ZERO,
        }
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        match &self.clock {
            Clock::Tokio => tokio::time::Instant::now().into_std(),
            Clock::Virtual { origin, .. } => *origin + self.elapsed(),
        }
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
