// SPDX-License-Identifier: AGPL-3.0-only

//! Deterministic pseudo-random source for quantum-excitation kicks.
//!
//! xorshift64* with Box–Muller transform. Not cryptographic; the point is
//! reproducibility: the same seed produces the same excitation sequence on
//! every backend variant, so CPU/GPU parity checks stay meaningful. The
//! state sits behind a `Mutex` because backend variants are shared through
//! `Arc` — contention is irrelevant at one lock per radiation kick batch.

use std::sync::Mutex;

const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seedable normal-deviate source shared by all backend variants.
#[derive(Debug)]
pub struct NormalSource {
    state: Mutex<u64>,
}

impl Default for NormalSource {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl NormalSource {
    /// Create a source with the given seed (zero is remapped: xorshift64*
    /// has an all-zero fixed point).
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(if seed == 0 { DEFAULT_SEED } else { seed }),
        }
    }

    /// Reset the stream. Exposed through the `set_random_seed` operation.
    pub fn reseed(&self, seed: u64) {
        if let Ok(mut s) = self.state.lock() {
            *s = if seed == 0 { DEFAULT_SEED } else { seed };
        }
    }

    fn next_u64(&self) -> u64 {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut x = *guard;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        *guard = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform deviate in (0, 1].
    #[must_use]
    pub fn next_uniform(&self) -> f64 {
        // Top 53 bits → [0,1), then shift to (0,1] so ln() below is finite.
        let u = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        1.0 - u
    }

    /// One pair of independent standard-normal deviates (Box–Muller).
    #[must_use]
    pub fn next_normal_pair(&self) -> (f64, f64) {
        let u1 = self.next_uniform();
        let u2 = self.next_uniform();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        (r * theta.cos(), r * theta.sin())
    }

    /// Fill a slice with standard-normal deviates.
    pub fn fill_normal(&self, out: &mut [f64]) {
        let mut chunks = out.chunks_exact_mut(2);
        for pair in &mut chunks {
            let (a, b) = self.next_normal_pair();
            pair[0] = a;
            pair[1] = b;
        }
        if let [last] = chunks.into_remainder() {
            *last = self.next_normal_pair().0;
        }
    }
}
