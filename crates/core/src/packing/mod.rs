//! Randomised placement of non-overlapping intervals.
//!
//! The packer first works out how many maximum-length events provably fit,
//! then places a random number of them with jitter. Each start time is drawn
//! from a window that still leaves room for every later event at its
//! maximum length, so placement never backs itself into a corner.

use rand::Rng;

use crate::{envelope::StartAndDuration, random::Range, Result, ShowGenError};

/// Bounds below this are treated as floating-point noise rather than an
/// infeasible window.
const BOUND_TOLERANCE: f64 = 1e-9;

/// Inputs for [`pack_intervals`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingParams {
    pub total_duration: f64,
    pub event_duration: Range,
    pub start_margin: f64,
    pub end_margin: f64,
    pub min_spacing: f64,
    pub occurrences_cap: usize,
    /// How far below the maximum the drawn count may fall.
    pub max_unused_occurrences: usize,
}

impl PackingParams {
    pub fn new(total_duration: f64, event_duration: Range, occurrences_cap: usize) -> Self {
        Self {
            total_duration,
            event_duration,
            start_margin: 0.0,
            end_margin: 0.0,
            min_spacing: 0.0,
            occurrences_cap,
            max_unused_occurrences: 2,
        }
    }

    pub fn margins(mut self, start_margin: f64, end_margin: f64) -> Self {
        self.start_margin = start_margin;
        self.end_margin = end_margin;
        self
    }

    pub fn spacing(mut self, min_spacing: f64) -> Self {
        self.min_spacing = min_spacing;
        self
    }

    pub fn max_unused(mut self, max_unused_occurrences: usize) -> Self {
        self.max_unused_occurrences = max_unused_occurrences;
        self
    }

    /// Largest count of maximum-length events, separated by `min_spacing`,
    /// that fits between the margins. Never exceeds the cap.
    pub fn max_occurrences(&self) -> usize {
        let longest = self.event_duration.max();
        let free = self.total_duration - longest - self.start_margin - self.end_margin;
        if free < 0.0 {
            return 0;
        }
        let stride = self.min_spacing + longest;
        if stride <= 0.0 {
            return self.occurrences_cap;
        }
        let fitting = 1.0 + (free / stride).floor();
        if fitting >= self.occurrences_cap as f64 {
            self.occurrences_cap
        } else {
            fitting as usize
        }
    }

    /// Smallest count the packer will draw when anything fits at all.
    pub fn min_occurrences(&self) -> usize {
        self.max_occurrences()
            .saturating_sub(self.max_unused_occurrences)
            .max(1)
    }
}

/// Places a random number of intervals described by `params`.
///
/// The returned intervals are sorted, pairwise separated by at least
/// `min_spacing`, start at or after `start_margin` and end at or before
/// `total_duration - end_margin`. When not even one maximum-length event
/// fits, the result is empty.
pub fn pack_intervals<R: Rng + ?Sized>(
    params: &PackingParams,
    rng: &mut R,
) -> Result<Vec<StartAndDuration>> {
    let max_occurrences = params.max_occurrences();
    if max_occurrences == 0 {
        return Ok(Vec::new());
    }
    let min_occurrences = params.min_occurrences();
    let occurrences = rng.random_range(min_occurrences..=max_occurrences);

    let longest = params.event_duration.max();
    let stride = params.min_spacing + longest;

    let mut intervals = Vec::with_capacity(occurrences);
    let mut lower_bound = params.start_margin;
    for index in 0..occurrences {
        let duration = params.event_duration.sample(rng);
        let remaining = (occurrences - index - 1) as f64;
        let upper_bound =
            params.total_duration - params.end_margin - remaining * stride - longest;

        debug_assert!(
            upper_bound + BOUND_TOLERANCE >= lower_bound,
            "packing window collapsed at event {index}: [{lower_bound}, {upper_bound}]"
        );
        if upper_bound + BOUND_TOLERANCE < lower_bound {
            return Err(ShowGenError::PackingInvariant {
                index,
                lower_bound,
                upper_bound,
            });
        }

        let start_time = if upper_bound <= lower_bound {
            lower_bound
        } else {
            rng.random_range(lower_bound..=upper_bound)
        };
        intervals.push(StartAndDuration::new(start_time, duration));
        lower_bound = start_time + duration + params.min_spacing;
    }

    Ok(intervals)
}
