//! Arc fitting against a candidate circle and analytic subdivision.

use std::f64::consts::TAU;

use super::circle::foot_of_perpendicular;
use super::types::{approx_equal, approx_zero, ArcDirection, Circle, Point};

/// A circular path segment committed by the fitter.
///
/// The sweep sign encodes direction: negative is clockwise (`G2`), positive
/// counter-clockwise (`G3`). Start and end carry the Z and extrusion
/// metadata needed for emission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    /// The fitted circle.
    pub circle: Circle,
    /// First sampled point (the anchor).
    pub start: Point,
    /// Last sampled point.
    pub end: Point,
    /// Signed angular travel in radians.
    pub sweep_radians: f64,
    /// Traversed length, including axial travel for helical arcs.
    pub length: f64,
}

impl Arc {
    /// Sweep direction derived from the sign of the angular travel.
    #[must_use]
    pub fn direction(&self) -> ArcDirection {
        if self.sweep_radians < 0.0 {
            ArcDirection::Clockwise
        } else {
            ArcDirection::CounterClockwise
        }
    }

    /// Center offset from the start point along X (the gcode `I` word).
    #[must_use]
    pub fn i(&self) -> f64 {
        self.circle.center.x - self.start.x
    }

    /// Center offset from the start point along Y (the gcode `J` word).
    #[must_use]
    pub fn j(&self) -> f64 {
        self.circle.center.y - self.start.y
    }

    /// Fits an arc through `points` on `circle`, validating traversal
    /// direction and the arc-length-versus-polyline-length tolerance.
    ///
    /// Direction is inferred from the signed area swept around the circle
    /// center. When the samples cancel out (all midpoints on the start-end
    /// chord), the direction whose arc length matches the polyline within
    /// `tolerance_percent` wins; if neither does, the fit fails.
    #[must_use]
    pub fn fit(
        circle: &Circle,
        points: &[Point],
        polyline_length: f64,
        tolerance_percent: f64,
        allow_3d: bool,
    ) -> Option<Self> {
        let first = points.first()?;
        let last = points.last()?;
        if points.len() < 3 || polyline_length <= 0.0 {
            return None;
        }

        let full_circle = approx_equal(first.x, last.x) && approx_equal(first.y, last.y);
        let area = signed_area_about_center(circle, points);

        let sweep = if full_circle {
            if approx_zero(area) {
                return None;
            }
            if area > 0.0 {
                TAU
            } else {
                -TAU
            }
        } else {
            let start_angle = (first.y - circle.center.y).atan2(first.x - circle.center.x);
            let end_angle = (last.y - circle.center.y).atan2(last.x - circle.center.x);
            if approx_zero(area) {
                // Degenerate sampling: pick the direction whose length
                // matches the traversed polyline.
                let cw = directed_sweep(start_angle, end_angle, ArcDirection::Clockwise);
                let ccw = directed_sweep(start_angle, end_angle, ArcDirection::CounterClockwise);
                return [cw, ccw].into_iter().find_map(|sweep| {
                    Self::with_checked_length(
                        circle,
                        first,
                        last,
                        sweep,
                        polyline_length,
                        tolerance_percent,
                        allow_3d,
                    )
                });
            }
            let direction = if area > 0.0 {
                ArcDirection::CounterClockwise
            } else {
                ArcDirection::Clockwise
            };
            directed_sweep(start_angle, end_angle, direction)
        };

        Self::with_checked_length(
            circle,
            first,
            last,
            sweep,
            polyline_length,
            tolerance_percent,
            allow_3d,
        )
    }

    fn with_checked_length(
        circle: &Circle,
        first: &Point,
        last: &Point,
        sweep: f64,
        polyline_length: f64,
        tolerance_percent: f64,
        allow_3d: bool,
    ) -> Option<Self> {
        let planar = sweep.abs() * circle.radius;
        let dz = last.z - first.z;
        let length = if allow_3d && !approx_zero(dz) {
            planar.hypot(dz)
        } else {
            planar
        };

        let relative_error = (length - polyline_length).abs() / polyline_length;
        if relative_error > tolerance_percent {
            return None;
        }

        Some(Self {
            circle: *circle,
            start: *first,
            end: *last,
            sweep_radians: sweep,
            length,
        })
    }

    /// Position on the arc at parameter `t` in `[0, 1]`, computed by
    /// rotating the start radius vector analytically.
    #[must_use]
    pub fn point_at(&self, t: f64) -> Point {
        let angle = self.sweep_radians * t;
        let (sin, cos) = angle.sin_cos();
        let vx = self.start.x - self.circle.center.x;
        let vy = self.start.y - self.circle.center.y;
        Point {
            x: vx.mul_add(cos, (-vy).mul_add(sin, self.circle.center.x)),
            y: vx.mul_add(sin, vy.mul_add(cos, self.circle.center.y)),
            z: (self.end.z - self.start.z).mul_add(t, self.start.z),
            e_relative: 0.0,
            is_extruder_relative: self.start.is_extruder_relative,
        }
    }

    /// Splits the arc into `n` equal angular sub-arcs.
    ///
    /// Intermediate endpoints come from [`Self::point_at`], so cumulative
    /// drift across the splits is zero; the final sub-arc reuses the original
    /// endpoint exactly.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn subdivide(&self, n: usize) -> Vec<Self> {
        if n <= 1 {
            return vec![*self];
        }

        let count = n as f64;
        let mut arcs = Vec::with_capacity(n);
        let mut cursor = self.start;
        for step in 1..=n {
            let end = if step == n {
                self.end
            } else {
                self.point_at(step as f64 / count)
            };
            arcs.push(Self {
                circle: self.circle,
                start: cursor,
                end,
                sweep_radians: self.sweep_radians / count,
                length: self.length / count,
            });
            cursor = end;
        }
        arcs
    }
}

/// Twice the signed area swept by the radius vector across consecutive
/// sample points. Positive means counter-clockwise traversal.
fn signed_area_about_center(circle: &Circle, points: &[Point]) -> f64 {
    let mut area = 0.0;
    for pair in points.windows(2) {
        let [a, b] = pair else { continue };
        let ax = a.x - circle.center.x;
        let ay = a.y - circle.center.y;
        let bx = b.x - circle.center.x;
        let by = b.y - circle.center.y;
        area += ax.mul_add(by, -(ay * bx));
    }
    area
}

/// Angular travel from `start_angle` to `end_angle` in the given direction.
pub(crate) fn directed_sweep(start_angle: f64, end_angle: f64, direction: ArcDirection) -> f64 {
    let delta = end_angle - start_angle;
    match direction {
        ArcDirection::Clockwise => {
            if delta >= 0.0 {
                delta - TAU
            } else {
                delta
            }
        }
        ArcDirection::CounterClockwise => {
            if delta <= 0.0 {
                delta + TAU
            } else {
                delta
            }
        }
    }
}

/// Worst radial deviation of the buffered points and their connecting
/// chords from `circle`.
///
/// Checks every point after the anchor plus, for each chord, the foot of
/// the perpendicular from the circle center when it exists. Returns `true`
/// when everything stays within `resolution_mm`.
#[must_use]
pub fn circle_fits_points(circle: &Circle, points: &[Point], resolution_mm: f64) -> bool {
    for point in points.iter().skip(1) {
        if circle.radial_deviation(point.x, point.y) > resolution_mm {
            return false;
        }
    }

    for pair in points.windows(2) {
        let [a, b] = pair else { continue };
        if let Some(foot) = foot_of_perpendicular(a, b, circle.center) {
            if circle.radial_deviation(foot.x, foot.y) > resolution_mm {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::cast_precision_loss)]
mod tests {
    use std::f64::consts::{FRAC_PI_2, PI};

    use super::*;
    use crate::geometry::types::PlanePoint;

    const TOLERANCE: f64 = 0.05;

    fn unit_circle() -> Circle {
        Circle {
            center: PlanePoint { x: 0.0, y: 0.0 },
            radius: 1.0,
        }
    }

    fn on_circle(radius: f64, degrees: f64) -> Point {
        let radians = degrees.to_radians();
        Point::at(radius * radians.cos(), radius * radians.sin(), 0.0)
    }

    fn arc_points(radius: f64, start_deg: f64, end_deg: f64, count: usize) -> Vec<Point> {
        (0..count)
            .map(|i| {
                let t = i as f64 / (count - 1) as f64;
                on_circle(radius, (end_deg - start_deg).mul_add(t, start_deg))
            })
            .collect()
    }

    fn polyline_length(points: &[Point]) -> f64 {
        points
            .windows(2)
            .map(|pair| pair[0].xy_distance(&pair[1]))
            .sum()
    }

    #[test]
    fn ut_arc_001_quarter_arc_counter_clockwise() {
        let circle = unit_circle();
        let points = arc_points(1.0, 0.0, 90.0, 7);
        let length = polyline_length(&points);
        let arc = Arc::fit(&circle, &points, length, TOLERANCE, false);
        assert!(arc.is_some(), "expected a fitted arc");
        if let Some(arc) = arc {
            assert_eq!(arc.direction(), ArcDirection::CounterClockwise);
            assert!((arc.sweep_radians - FRAC_PI_2).abs() < 1e-9);
            assert!((arc.length - FRAC_PI_2).abs() < 0.01);
        }
    }

    #[test]
    fn ut_arc_002_reversed_traversal_is_clockwise() {
        let circle = unit_circle();
        let points = arc_points(1.0, 90.0, 0.0, 7);
        let length = polyline_length(&points);
        let arc = Arc::fit(&circle, &points, length, TOLERANCE, false);
        assert!(arc.is_some(), "expected a fitted arc");
        if let Some(arc) = arc {
            assert_eq!(arc.direction(), ArcDirection::Clockwise);
            assert!((arc.sweep_radians + FRAC_PI_2).abs() < 1e-9);
        }
    }

    #[test]
    fn ut_arc_003_length_mismatch_fails_the_fit() {
        let circle = unit_circle();
        let points = arc_points(1.0, 0.0, 90.0, 7);
        // Claim the polyline was twice as long as the arc.
        let arc = Arc::fit(&circle, &points, PI, TOLERANCE, false);
        assert!(arc.is_none());
    }

    #[test]
    fn ut_arc_004_full_circle_uses_midpoint_direction() {
        let circle = unit_circle();
        let mut points = arc_points(1.0, 0.0, 360.0, 13);
        points[12] = points[0];
        let length = polyline_length(&points);
        let arc = Arc::fit(&circle, &points, length, TOLERANCE, false);
        assert!(arc.is_some(), "expected a full-circle arc");
        if let Some(arc) = arc {
            assert!((arc.sweep_radians - TAU).abs() < 1e-9);
            assert_eq!(arc.direction(), ArcDirection::CounterClockwise);
        }
    }

    #[test]
    fn ut_arc_005_helical_length_includes_axial_travel() {
        let circle = unit_circle();
        let mut points = arc_points(1.0, 0.0, 180.0, 9);
        let count = points.len();
        for (i, point) in points.iter_mut().enumerate() {
            point.z = 0.4 * (i as f64) / ((count - 1) as f64);
        }
        let planar = polyline_length(&points);
        let expected = PI.hypot(0.4);
        let arc = Arc::fit(&circle, &points, planar.hypot(0.4), 0.05, true);
        assert!(arc.is_some(), "expected a helical arc");
        if let Some(arc) = arc {
            assert!((arc.length - expected).abs() < 0.02);
        }
    }

    #[test]
    fn ut_arc_006_point_at_stays_on_the_circle() {
        let circle = unit_circle();
        let points = arc_points(1.0, 0.0, 90.0, 7);
        let length = polyline_length(&points);
        let arc = Arc::fit(&circle, &points, length, TOLERANCE, false);
        assert!(arc.is_some(), "expected a fitted arc");
        if let Some(arc) = arc {
            for step in 0..=10 {
                let p = arc.point_at(f64::from(step) / 10.0);
                assert!(circle.radial_deviation(p.x, p.y) < 1e-9);
            }
        }
    }

    #[test]
    fn ut_arc_007_subdivision_is_driftless() {
        let circle = unit_circle();
        let points = arc_points(1.0, 0.0, 180.0, 13);
        let length = polyline_length(&points);
        let arc = Arc::fit(&circle, &points, length, TOLERANCE, false);
        assert!(arc.is_some(), "expected a fitted arc");
        if let Some(arc) = arc {
            let subs = arc.subdivide(4);
            assert_eq!(subs.len(), 4);
            assert_eq!(subs[0].start, arc.start);
            assert_eq!(subs[3].end, arc.end);
            for pair in subs.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
            let sweep_sum: f64 = subs.iter().map(|a| a.sweep_radians).sum();
            assert!((sweep_sum - arc.sweep_radians).abs() < 1e-12);
            for sub in &subs {
                assert!(circle.radial_deviation(sub.end.x, sub.end.y) < 1e-9);
            }
        }
    }

    #[test]
    fn ut_arc_008_chord_feet_gate_coarse_sampling() {
        let circle = unit_circle();
        // A 90-degree arc sampled every 45 degrees has a chord sagitta of
        // about 0.076, far above a 0.01 resolution.
        let coarse = arc_points(1.0, 0.0, 90.0, 3);
        assert!(!circle_fits_points(&circle, &coarse, 0.01));
        assert!(circle_fits_points(&circle, &coarse, 0.1));
    }

    #[test]
    fn ut_arc_009_off_circle_point_fails_the_fit_check() {
        let circle = unit_circle();
        let mut points = arc_points(1.0, 0.0, 90.0, 7);
        points[3].x += 0.02;
        assert!(!circle_fits_points(&circle, &points, 0.01));
    }

    #[test]
    fn bc_arc_001_two_points_cannot_form_an_arc() {
        let circle = unit_circle();
        let points = arc_points(1.0, 0.0, 90.0, 2);
        let length = polyline_length(&points);
        assert!(Arc::fit(&circle, &points, length, TOLERANCE, false).is_none());
    }

    #[test]
    fn bc_arc_002_zero_polyline_length_fails() {
        let circle = unit_circle();
        let points = arc_points(1.0, 0.0, 90.0, 7);
        assert!(Arc::fit(&circle, &points, 0.0, TOLERANCE, false).is_none());
    }
}
