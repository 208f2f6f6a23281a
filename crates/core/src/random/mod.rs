//! Sampling primitives shared by every generator stage.
//!
//! Nothing in the crate reaches for a global generator. Functions that need
//! randomness take `&mut R where R: Rng + ?Sized`, so callers can pass a
//! seeded [`ChaCha8Rng`] in tests or a `&mut dyn RngCore` when the concrete
//! source is erased.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{Result, ShowGenError};

/// Concrete generator used by the command line driver and the tests.
pub type ShowRng = ChaCha8Rng;

/// Deterministic generator: equal seeds and inputs give identical shows.
pub fn seeded(seed: u64) -> ShowRng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Fresh generator seeded from the thread-local entropy source.
pub fn from_entropy() -> ShowRng {
    ChaCha8Rng::from_rng(&mut rand::rng())
}

/// Closed sampling interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr", into = "RangeRepr")]
pub struct Range {
    min: f64,
    max: f64,
}

#[derive(Serialize, Deserialize)]
struct RangeRepr {
    min: f64,
    max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(ShowGenError::invalid(format!(
                "range bounds must be finite, got [{min}, {max}]"
            )));
        }
        if min > max {
            return Err(ShowGenError::invalid(format!(
                "range minimum {min} exceeds maximum {max}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Degenerate range that always samples `value`.
    pub fn fixed(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Draws uniformly from the interval. A degenerate range consumes no
    /// randomness.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.min == self.max {
            self.min
        } else {
            rng.random_range(self.min..=self.max)
        }
    }
}

impl TryFrom<RangeRepr> for Range {
    type Error = ShowGenError;

    fn try_from(value: RangeRepr) -> Result<Self> {
        Range::new(value.min, value.max)
    }
}

impl From<Range> for RangeRepr {
    fn from(value: Range) -> Self {
        Self {
            min: value.min,
            max: value.max,
        }
    }
}
