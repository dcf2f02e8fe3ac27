//! Error types for the arc welding pipeline.

use thiserror::Error;

/// Failures of the geometric constructions.
///
/// These never escape the library. A geometry failure only causes the fitter
/// to reject a candidate point, which the welder answers by committing or
/// flushing.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum GeometryError {
    /// The three construction points lie on a single line.
    #[error("construction points are colinear")]
    Colinear,

    /// The constructed circle has a vanishing radius.
    #[error("circle radius is zero")]
    ZeroRadius,

    /// The constructed circle is larger than the configured maximum.
    #[error("circle radius {radius} exceeds the maximum of {max_radius}")]
    RadiusExceeded {
        /// Radius of the rejected circle.
        radius: f64,
        /// Configured upper bound.
        max_radius: f64,
    },
}

/// An invalid option combination, rejected before a run starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// `resolution_mm` must be strictly positive.
    #[error("resolution_mm must be positive, got {0}")]
    InvalidResolution(f64),

    /// `path_tolerance_percent` must lie in the open interval (0, 1).
    #[error("path_tolerance_percent must be between 0 and 1, got {0}")]
    InvalidPathTolerance(f64),

    /// `max_radius_mm` must be strictly positive.
    #[error("max_radius_mm must be positive, got {0}")]
    InvalidMaxRadius(f64),

    /// `min_arc_segments` needs at least three points to define a circle.
    #[error("min_arc_segments must be at least 3, got {0}")]
    InvalidMinSegments(usize),

    /// `max_arc_segments` must hold `min_arc_segments` and stay under the cap.
    #[error("max_arc_segments must be between {1} and {2}, got {0}")]
    InvalidMaxSegments(usize, usize, usize),

    /// Output precision is limited to 3 through 6 fractional digits.
    #[error("{axis} precision must be between 3 and 6, got {digits}")]
    InvalidPrecision {
        /// Which precision setting was rejected (`"xyz"` or `"e"`).
        axis: &'static str,
        /// The rejected digit count.
        digits: u8,
    },

    /// `extrusion_rate_variance_percent` may not be negative.
    #[error("extrusion_rate_variance_percent may not be negative, got {0}")]
    InvalidExtrusionRateVariance(f64),

    /// `notification_period_seconds` must be strictly positive.
    #[error("notification_period_seconds must be positive, got {0}")]
    InvalidNotificationPeriod(f64),
}

/// Fatal errors that abort a welding run.
#[derive(Debug, Error)]
pub enum WeldError {
    /// The source was unreadable or the target unwritable.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration was rejected before the run started.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A line the tokenizer could not parse.
///
/// Not fatal: the welder forwards the offending line verbatim and counts a
/// warning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not parse `{line}`: {reason}")]
pub struct ParseError {
    /// The offending source line.
    pub line: String,
    /// Human-readable description of the failure.
    pub reason: String,
}
