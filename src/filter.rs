#![forbid(unsafe_code)]

//! Duration bounds applied to probed video metadata.

use crate::downloader::VideoMetadata;

/// A single inclusive bound on a video's length in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationBound {
    Min(f64),
    Max(f64),
}

impl DurationBound {
    pub fn admits(&self, seconds: f64) -> bool {
        match *self {
            DurationBound::Min(min) => seconds >= min,
            DurationBound::Max(max) => seconds <= max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accepted,
    OutOfBounds,
    /// The probe returned no duration; such videos are never accepted.
    MissingDuration,
}

/// All bounds must hold. Absent bounds are not stored at all, so an empty
/// filter accepts every video whose duration is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DurationFilter {
    bounds: Vec<DurationBound>,
}

/// Builds a filter from optional lower and upper bounds in seconds.
pub fn build_filter(min_seconds: Option<f64>, max_seconds: Option<f64>) -> DurationFilter {
    let bounds = min_seconds
        .map(DurationBound::Min)
        .into_iter()
        .chain(max_seconds.map(DurationBound::Max))
        .collect();
    DurationFilter { bounds }
}

impl DurationFilter {
    pub fn bounds(&self) -> &[DurationBound] {
        &self.bounds
    }

    pub fn evaluate(&self, metadata: &VideoMetadata) -> FilterDecision {
        let Some(seconds) = metadata.duration else {
            return FilterDecision::MissingDuration;
        };
        if self.bounds.iter().all(|bound| bound.admits(seconds)) {
            FilterDecision::Accepted
        } else {
            FilterDecision::OutOfBounds
        }
    }
}
