//! Welder configuration and pre-run validation.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Hard upper bound on the rolling point buffer.
pub const MAX_SEGMENT_CAP: usize = 4096;

/// Upper bound on emitted fractional digits for any axis.
pub const MAX_PRECISION: u8 = 6;

const MIN_PRECISION: u8 = 3;

/// Options controlling a welding run.
///
/// Defaults follow common slicer output: 0.05 mm resolution, 5% path
/// tolerance, and a 1 km radius ceiling that rejects near-straight runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelderConfig {
    /// Maximum perpendicular deviation between the arc and the source
    /// polyline, in millimeters. Must be positive.
    pub resolution_mm: f64,
    /// Allowed relative error between arc length and polyline length,
    /// as a fraction in (0, 1).
    pub path_tolerance_percent: f64,
    /// Circles with a radius above this are rejected.
    pub max_radius_mm: f64,
    /// Minimum number of sampled points per candidate arc.
    pub min_arc_segments: usize,
    /// Rolling point buffer capacity.
    pub max_arc_segments: usize,
    /// Permit Z changes within an arc (helical moves).
    pub allow_3d_arcs: bool,
    /// Permit arcs with zero extrusion.
    pub allow_travel_arcs: bool,
    /// Raise output precision to match observed input precision.
    pub allow_dynamic_precision: bool,
    /// Initial fractional digits for X, Y, Z, I and J.
    pub default_xyz_precision: u8,
    /// Initial fractional digits for E.
    pub default_e_precision: u8,
    /// Tolerance on extrusion-per-mm variation inside an arc, as a
    /// fraction. Zero disables the check.
    pub extrusion_rate_variance_percent: f64,
    /// Split arcs so that no emitted line exceeds this many bytes.
    /// Zero disables splitting.
    pub max_gcode_length: usize,
    /// Whether `G90`/`G91` also switch the extruder axis mode.
    pub g90_g91_influences_extruder: bool,
    /// Seconds between progress callback invocations.
    pub notification_period_seconds: f64,
}

impl Default for WelderConfig {
    fn default() -> Self {
        Self {
            resolution_mm: 0.05,
            path_tolerance_percent: 0.05,
            max_radius_mm: 1_000_000.0,
            min_arc_segments: 5,
            max_arc_segments: 50,
            allow_3d_arcs: false,
            allow_travel_arcs: false,
            allow_dynamic_precision: false,
            default_xyz_precision: 3,
            default_e_precision: 5,
            extrusion_rate_variance_percent: 0.05,
            max_gcode_length: 0,
            g90_g91_influences_extruder: false,
            notification_period_seconds: 1.0,
        }
    }
}

impl WelderConfig {
    /// Validates the option combination before a run starts.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered, checking options in
    /// declaration order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.resolution_mm.is_finite() || self.resolution_mm <= 0.0 {
            return Err(ConfigError::InvalidResolution(self.resolution_mm));
        }
        if !self.path_tolerance_percent.is_finite()
            || self.path_tolerance_percent <= 0.0
            || self.path_tolerance_percent >= 1.0
        {
            return Err(ConfigError::InvalidPathTolerance(
                self.path_tolerance_percent,
            ));
        }
        if !self.max_radius_mm.is_finite() || self.max_radius_mm <= 0.0 {
            return Err(ConfigError::InvalidMaxRadius(self.max_radius_mm));
        }
        if self.min_arc_segments < 3 {
            return Err(ConfigError::InvalidMinSegments(self.min_arc_segments));
        }
        if self.max_arc_segments < self.min_arc_segments || self.max_arc_segments > MAX_SEGMENT_CAP
        {
            return Err(ConfigError::InvalidMaxSegments(
                self.max_arc_segments,
                self.min_arc_segments,
                MAX_SEGMENT_CAP,
            ));
        }
        Self::validate_precision("xyz", self.default_xyz_precision)?;
        Self::validate_precision("e", self.default_e_precision)?;
        if !self.extrusion_rate_variance_percent.is_finite()
            || self.extrusion_rate_variance_percent < 0.0
        {
            return Err(ConfigError::InvalidExtrusionRateVariance(
                self.extrusion_rate_variance_percent,
            ));
        }
        if !self.notification_period_seconds.is_finite() || self.notification_period_seconds <= 0.0
        {
            return Err(ConfigError::InvalidNotificationPeriod(
                self.notification_period_seconds,
            ));
        }
        Ok(())
    }

    fn validate_precision(axis: &'static str, digits: u8) -> Result<(), ConfigError> {
        if (MIN_PRECISION..=MAX_PRECISION).contains(&digits) {
            Ok(())
        } else {
            Err(ConfigError::InvalidPrecision { axis, digits })
        }
    }
}
