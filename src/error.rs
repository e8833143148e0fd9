#![forbid(unsafe_code)]

//! Errors raised while parsing user-supplied durations and timestamps.
//!
//! These are the only failures that abort a run; everything that happens
//! after argument parsing degrades to fewer results instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid duration format: {0:?}")]
    InvalidFormat(String),
    #[error("invalid duration bound {0:?}, expected hh:mm:ss or a number of seconds")]
    InvalidDuration(String),
    #[error("invalid start time {0:?}, expected an ISO-8601 datetime")]
    InvalidTimestamp(String),
}
