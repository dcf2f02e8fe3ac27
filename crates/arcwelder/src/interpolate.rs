//! Arc interpolation: the inverse of welding, expanding a `G2`/`G3` move
//! back into a polyline computed from the true circle.
//!
//! The round-trip tests drive this to check that welded output stays within
//! the configured resolution of the source path.

use std::f64::consts::TAU;

use crate::geometry::arc::directed_sweep;
use crate::geometry::{approx_equal, approx_zero, Arc, ArcDirection, Circle, PlanePoint, Point};

/// Expands a committed arc into vertices no more than `mm_per_segment`
/// apart along the circumference, start and end included.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn interpolate_arc(arc: &Arc, mm_per_segment: f64) -> Vec<Point> {
    let planar = arc.sweep_radians.abs() * arc.circle.radius;
    let segments = if mm_per_segment > 0.0 {
        ((planar / mm_per_segment).ceil() as usize).max(1)
    } else {
        1
    };

    let mut points = Vec::with_capacity(segments + 1);
    for step in 0..=segments {
        points.push(arc.point_at(step as f64 / segments as f64));
    }
    points
}

/// Expands an arc move given in gcode form: endpoint plus `I`/`J` center
/// offsets from `start`.
///
/// Coincident start and end with a non-zero center offset is a full circle.
/// Returns `None` for a degenerate zero-radius arc.
#[must_use]
pub fn expand_arc_move(
    start: Point,
    end: Point,
    i: f64,
    j: f64,
    direction: ArcDirection,
    mm_per_segment: f64,
) -> Option<Vec<Point>> {
    let center = PlanePoint {
        x: start.x + i,
        y: start.y + j,
    };
    let radius = center.distance_to(start.x, start.y);
    if approx_zero(radius) {
        return None;
    }

    let full_circle = approx_equal(start.x, end.x) && approx_equal(start.y, end.y);
    let sweep = if full_circle {
        match direction {
            ArcDirection::Clockwise => -TAU,
            ArcDirection::CounterClockwise => TAU,
        }
    } else {
        let start_angle = (start.y - center.y).atan2(start.x - center.x);
        let end_angle = (end.y - center.y).atan2(end.x - center.x);
        directed_sweep(start_angle, end_angle, direction)
    };

    let arc = Arc {
        circle: Circle { center, radius },
        start,
        end,
        sweep_radians: sweep,
        length: sweep.abs() * radius,
    };
    Some(interpolate_arc(&arc, mm_per_segment))
}
