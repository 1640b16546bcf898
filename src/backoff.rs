//! Backoff Calculator
//!
//! Computes retry delays with exponential growth, multiplicative jitter, and a hard cap.
//! An explicit wait hint from a rate-limited collaborator replaces the exponential formula.
//! Randomness is injected through [`JitterSource`] so delays are reproducible in tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lower bound of the multiplicative jitter factor.
pub const JITTER_LOW: f64 = 0.9;
/// Upper bound of the multiplicative jitter factor.
pub const JITTER_HIGH: f64 = 1.1;

// 2^40 * 1ms already exceeds any sane cap; larger exponents only risk overflow.
const MAX_EXPONENT: u32 = 40;

/// Source of the jitter factor applied to exponential delays.
pub trait JitterSource: Send {
    /// Returns a factor in `[low, high]`.
    fn factor(&mut self, low: f64, high: f64) -> f64;
}

/// Uniform jitter drawn from a seedable RNG.
pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl JitterSource for RandomJitter {
    fn factor(&mut self, low: f64, high: f64) -> f64 {
        self.rng.gen_range(low..=high)
    }
}

/// Constant jitter factor, clamped into the requested range.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl FixedJitter {
    /// A factor of exactly 1.0.
    pub fn none() -> Self {
        Self(1.0)
    }
}

impl JitterSource for FixedJitter {
    fn factor(&mut self, low: f64, high: f64) -> f64 {
        self.0.clamp(low, high)
    }
}

/// Base and cap for exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    pub fn delay_for(
        &self,
        attempt: u32,
        hint: Option<Duration>,
        jitter: &mut dyn JitterSource,
    ) -> Duration {
        compute_delay(attempt, self.base_delay, self.max_delay, hint, jitter)
    }
}

/// Compute the delay before retry number `attempt` (0-indexed).
///
/// With a hint the result is `max(hint, base_delay)` capped at `max_delay`, without jitter.
/// Otherwise it is `base_delay * 2^attempt * jitter` capped at `max_delay`, with the jitter
/// factor drawn from `[0.9, 1.1]`.
pub fn compute_delay(
    attempt: u32,
    base_delay: Duration,
    max_delay: Duration,
    hint_override: Option<Duration>,
    jitter: &mut dyn JitterSource,
) -> Duration {
    if let Some(hint) = hint_override {
        return hint.max(base_delay).min(max_delay);
    }

    let exponent = attempt.min(MAX_EXPONENT) as i32;
    let raw_ms = base_delay.as_secs_f64() * 1000.0 * 2f64.powi(exponent);
    let factor = jitter.factor(JITTER_LOW, JITTER_HIGH);
    let jittered_ms = raw_ms * factor;
    let max_ms = max_delay.as_secs_f64() * 1000.0;

    Duration::from_secs_f64(jittered_ms.min(max_ms).max(0.0) / 1000.0)
}
