//! Crate error types.
//!
//! Following the teacher's own mix: structured `thiserror` enums for the
//! data-shape-facing errors (`patterns::io::PatternIoError` is the model),
//! one enum per fallible component rather than one crate-wide catch-all.

use thiserror::Error;

/// Errors from [`ParameterCurve::from_json`](crate::curve::ParameterCurve::from_json).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CurveError {
    #[error("malformed parameter curve JSON")]
    MalformedJson,
}

/// Errors from [`PerformanceNote`](crate::performance_note::PerformanceNote)
/// operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PerformanceNoteError {
    /// A split point landed outside the note's length tuple even after the
    /// caller verified it was within `(start_time, end_time)`. This is the
    /// defensive check the original ported from (`_split_length`'s
    /// `ValueError`); it should not be reachable through the public
    /// `split_at_beat` API, which only calls into this path once the beat
    /// has already been range-checked.
    #[error("split point {0} does not fall within the note's length segments")]
    SplitPointOutOfRange(f64),

    #[error("malformed performance note JSON: {0}")]
    MalformedJson(String),

    #[error(transparent)]
    Curve(#[from] CurveError),
}

/// Errors from [`ClockConfig`](crate::config::ClockConfig) TOML round-trips.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse clock config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize clock config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to read clock config file: {0}")]
    Io(#[from] std::io::Error),
}
