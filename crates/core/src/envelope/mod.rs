//! Piecewise-linear keyframe envelopes and periodic event helpers.
//!
//! All builders are pure: they take their inputs (and a random source where
//! noted) and return fresh vectors. Consumers evaluate envelopes with
//! [`value_at`], which interpolates linearly between consecutive keyframes.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{random::Range, Result, ShowGenError};

/// One point of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyFrame {
    pub time: f64,
    pub value: f64,
}

impl KeyFrame {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// A single placed interval on a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartAndDuration {
    pub start_time: f64,
    pub duration: f64,
}

impl StartAndDuration {
    pub fn new(start_time: f64, duration: f64) -> Self {
        Self {
            start_time,
            duration,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Fade-in / hold / fade-out envelope starting at zero and peaking at 1.0.
///
/// See [`standard_level_at`].
pub fn standard_level(duration: f64, fade_in: f64, fade_out: f64) -> [KeyFrame; 4] {
    standard_level_at(duration, fade_in, fade_out, 0.0, 1.0)
}

/// Fade-in / hold / fade-out envelope shifted by `offset` and peaking at
/// `level`.
///
/// `fade_in + fade_out` is expected to fit in `duration`. When it does not,
/// the hold segment runs backwards; [`value_at`] evaluates such an envelope as
/// a direct fade up and down without a hold.
pub fn standard_level_at(
    duration: f64,
    fade_in: f64,
    fade_out: f64,
    offset: f64,
    level: f64,
) -> [KeyFrame; 4] {
    [
        KeyFrame::new(offset, 0.0),
        KeyFrame::new(offset + fade_in, level),
        KeyFrame::new(offset + duration - fade_out, level),
        KeyFrame::new(offset + duration, 0.0),
    ]
}

/// Square-ish pulse alternating between `range.min()` and `range.max()` every
/// `period`, each transition taking `fade` seconds.
///
/// The starting polarity is random. Two keyframes are emitted per step: the
/// level being left, then the new level `fade` later. The last step may run
/// past `duration`; clipping is left to the consumer.
pub fn pulse_key_frames<R: Rng + ?Sized>(
    duration: f64,
    period: f64,
    fade: f64,
    range: Range,
    rng: &mut R,
) -> Result<Vec<KeyFrame>> {
    if period <= 0.0 {
        return Err(ShowGenError::invalid(format!(
            "pulse period must be positive, got {period}"
        )));
    }
    if fade < 0.0 || fade > period {
        return Err(ShowGenError::invalid(format!(
            "pulse fade {fade} must lie within [0, {period}]"
        )));
    }

    let mut high = rng.random_bool(0.5);
    let level = |high: bool| if high { range.max() } else { range.min() };

    let mut frames = Vec::new();
    let mut previous = level(high);
    let mut time = 0.0;
    while time < duration {
        let current = level(high);
        frames.push(KeyFrame::new(time, previous));
        frames.push(KeyFrame::new(time + fade, current));
        previous = current;
        high = !high;
        time += period;
    }
    Ok(frames)
}

/// Events of fixed `duration` every `period`, starting at `offset`, for as
/// long as the start lies before `total_duration`.
///
/// No feasibility check: the last event may extend past `total_duration`.
pub fn periodic_events(
    total_duration: f64,
    period: f64,
    duration: f64,
    offset: f64,
) -> Result<Vec<StartAndDuration>> {
    if period <= 0.0 {
        return Err(ShowGenError::invalid(format!(
            "event period must be positive, got {period}"
        )));
    }

    let mut events = Vec::new();
    let mut start = offset;
    while start < total_duration {
        events.push(StartAndDuration::new(start, duration));
        start += period;
    }
    Ok(events)
}

/// Splits `total_duration` into consecutive durations drawn from `range`.
///
/// Draws until the running sum reaches the total, then rescales the whole
/// list with [`contract_times`] so that it sums to `total_duration`.
pub fn random_durations<R: Rng + ?Sized>(
    total_duration: f64,
    range: Range,
    rng: &mut R,
) -> Result<Vec<f64>> {
    if range.min() < 0.0 || range.max() <= 0.0 {
        return Err(ShowGenError::invalid(format!(
            "duration range must be non-negative with a positive maximum, got [{}, {}]",
            range.min(),
            range.max()
        )));
    }

    let mut durations = Vec::new();
    let mut sum = 0.0;
    while sum < total_duration {
        let duration = range.sample(rng);
        sum += duration;
        durations.push(duration);
    }
    Ok(contract_times(durations, total_duration))
}

/// Uniformly rescales `times` so that they sum to `total_duration`.
pub fn contract_times(mut times: Vec<f64>, total_duration: f64) -> Vec<f64> {
    let sum: f64 = times.iter().sum();
    if sum <= 0.0 {
        return times;
    }
    let factor = total_duration / sum;
    for time in &mut times {
        *time *= factor;
    }
    times
}

/// Evaluates an envelope at `time`.
///
/// Before the first keyframe the first value holds, after the last keyframe
/// the last value holds. Segments are right-continuous, so at a step the later
/// keyframe wins. Segments running backwards in time are skipped; where the
/// remaining forward segments overlap, the lowest value wins.
pub fn value_at(frames: &[KeyFrame], time: f64) -> f64 {
    let (first, last) = match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };
    if time < first.time {
        return first.value;
    }

    let mut value: Option<f64> = None;
    for pair in frames.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b.time <= a.time || time < a.time || time >= b.time {
            continue;
        }
        let t = (time - a.time) / (b.time - a.time);
        let candidate = a.value + (b.value - a.value) * t;
        value = Some(value.map_or(candidate, |v: f64| v.min(candidate)));
    }

    match value {
        Some(value) => value,
        None if time >= last.time => last.value,
        None => frames
            .iter()
            .rev()
            .find(|frame| frame.time <= time)
            .map_or(first.value, |frame| frame.value),
    }
}
