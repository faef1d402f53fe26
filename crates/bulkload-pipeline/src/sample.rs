//! KV Sampler
//!
//! The distributed topology taps each worker's KV stream and forwards a
//! size-weighted sample of keys to the coordinator, which uses them to
//! pick range boundaries. A pair is admitted with probability
//! `(|key| + |value|) / sample_size`, so the expected bytes between two
//! sampled keys is `sample_size` regardless of row width. A sample size
//! of zero admits everything.
//!
//! The randomness is seeded per worker; the sampler is deterministic only
//! in expectation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bulkload_core::KeyValue;

/// Size-weighted admission sampler.
pub struct KvSampler {
    sample_size: f64,
    rng: StdRng,
}

impl KvSampler {
    /// Sampler with a fresh per-worker seed.
    pub fn new(sample_size: u32) -> Self {
        Self::with_seed(sample_size, rand::random())
    }

    /// Deterministic sampler for tests.
    pub fn with_seed(sample_size: u32, seed: u64) -> Self {
        Self {
            sample_size: sample_size as f64,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Whether to admit this pair.
    pub fn sample(&mut self, kv: &KeyValue) -> bool {
        if self.sample_size == 0.0 {
            return true;
        }
        let probability = kv.estimated_size() as f64 / self.sample_size;
        probability > self.rng.gen::<f64>()
    }
}
