//! Circle construction and point-to-segment projection.

use crate::error::GeometryError;

use super::types::{approx_zero, Circle, PlanePoint, Point, COLINEARITY_EPSILON};

impl Circle {
    /// Constructs the circle through three points by perpendicular-bisector
    /// intersection.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Colinear`] when the points lie on a single
    /// line, [`GeometryError::ZeroRadius`] when they coincide, and
    /// [`GeometryError::RadiusExceeded`] when the radius is above
    /// `max_radius`.
    pub fn from_three_points(
        p0: &Point,
        p1: &Point,
        p2: &Point,
        max_radius: f64,
    ) -> Result<Self, GeometryError> {
        let ax = p1.x - p0.x;
        let ay = p1.y - p0.y;
        let bx = p2.x - p1.x;
        let by = p2.y - p1.y;

        let cross = ax.mul_add(by, -(ay * bx));
        if cross.abs() < COLINEARITY_EPSILON {
            return Err(GeometryError::Colinear);
        }

        // Circumcenter from the standard determinant form.
        let sq0 = p0.x.mul_add(p0.x, p0.y * p0.y);
        let sq1 = p1.x.mul_add(p1.x, p1.y * p1.y);
        let sq2 = p2.x.mul_add(p2.x, p2.y * p2.y);
        let d = 2.0 * cross;
        let cx = (sq0 * (p1.y - p2.y) + sq1 * (p2.y - p0.y) + sq2 * (p0.y - p1.y)) / d;
        let cy = (sq0 * (p2.x - p1.x) + sq1 * (p0.x - p2.x) + sq2 * (p1.x - p0.x)) / d;

        let center = PlanePoint { x: cx, y: cy };
        let radius = center.distance_to(p0.x, p0.y);
        if approx_zero(radius) {
            return Err(GeometryError::ZeroRadius);
        }
        if radius > max_radius {
            return Err(GeometryError::RadiusExceeded { radius, max_radius });
        }

        Ok(Self { center, radius })
    }

    /// Absolute difference between the radius and the distance from the
    /// center to `(x, y)`.
    #[must_use]
    pub fn radial_deviation(&self, x: f64, y: f64) -> f64 {
        (self.center.distance_to(x, y) - self.radius).abs()
    }
}

/// Projects `q` onto the segment from `a` to `b`.
///
/// Returns the foot of the perpendicular only when it falls strictly between
/// the endpoints; the endpoints themselves are covered by the radial check
/// on the buffered points.
#[must_use]
pub fn foot_of_perpendicular(a: &Point, b: &Point, q: PlanePoint) -> Option<PlanePoint> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);
    if approx_zero(length_sq) {
        return None;
    }

    let t = ((q.x - a.x).mul_add(dx, (q.y - a.y) * dy)) / length_sq;
    if t <= 0.0 || t >= 1.0 {
        return None;
    }

    Some(PlanePoint {
        x: dx.mul_add(t, a.x),
        y: dy.mul_add(t, a.y),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::types::approx_equal;

    #[test]
    fn ut_circ_001_unit_circle_through_cardinal_points() {
        let result = Circle::from_three_points(
            &Point::at(1.0, 0.0, 0.0),
            &Point::at(0.0, 1.0, 0.0),
            &Point::at(-1.0, 0.0, 0.0),
            10.0,
        );
        assert!(result.is_ok(), "expected a circle");
        if let Ok(circle) = result {
            assert!(approx_equal(circle.radius, 1.0));
            assert!(approx_zero(circle.center.x));
            assert!(approx_zero(circle.center.y));
        }
    }

    #[test]
    fn ut_circ_002_offset_center_is_recovered() {
        let result = Circle::from_three_points(
            &Point::at(15.0, 3.0, 0.0),
            &Point::at(10.0, 8.0, 0.0),
            &Point::at(5.0, 3.0, 0.0),
            100.0,
        );
        assert!(result.is_ok(), "expected a circle");
        if let Ok(circle) = result {
            assert!(approx_equal(circle.center.x, 10.0));
            assert!(approx_equal(circle.center.y, 3.0));
            assert!(approx_equal(circle.radius, 5.0));
        }
    }

    #[test]
    fn ut_circ_003_colinear_points_are_rejected() {
        let result = Circle::from_three_points(
            &Point::at(0.0, 0.0, 0.0),
            &Point::at(1.0, 1.0, 0.0),
            &Point::at(2.0, 2.0, 0.0),
            100.0,
        );
        assert_eq!(result, Err(GeometryError::Colinear));
    }

    #[test]
    fn ut_circ_004_radius_above_maximum_is_rejected() {
        let result = Circle::from_three_points(
            &Point::at(1.0, 0.0, 0.0),
            &Point::at(0.0, 1.0, 0.0),
            &Point::at(-1.0, 0.0, 0.0),
            0.5,
        );
        assert!(matches!(result, Err(GeometryError::RadiusExceeded { .. })));
    }

    #[test]
    fn ut_circ_005_radial_deviation_is_zero_on_the_circle() {
        let circle = Circle {
            center: PlanePoint { x: 2.0, y: 3.0 },
            radius: 4.0,
        };
        assert!(approx_zero(circle.radial_deviation(6.0, 3.0)));
        assert!(approx_equal(circle.radial_deviation(2.0, 3.0), 4.0));
    }

    #[test]
    fn ut_circ_006_perpendicular_foot_inside_segment() {
        let foot = foot_of_perpendicular(
            &Point::at(0.0, 0.0, 0.0),
            &Point::at(10.0, 0.0, 0.0),
            PlanePoint { x: 4.0, y: 5.0 },
        );
        assert!(foot.is_some(), "expected a projection");
        if let Some(foot) = foot {
            assert!(approx_equal(foot.x, 4.0));
            assert!(approx_zero(foot.y));
        }
    }

    #[test]
    fn bc_circ_001_projection_onto_endpoint_is_rejected() {
        // Projection lands exactly on the segment start; the open interval
        // excludes it.
        let foot = foot_of_perpendicular(
            &Point::at(0.0, 0.0, 0.0),
            &Point::at(10.0, 0.0, 0.0),
            PlanePoint { x: 0.0, y: 5.0 },
        );
        assert!(foot.is_none());
    }

    #[test]
    fn bc_circ_002_projection_beyond_segment_is_rejected() {
        let foot = foot_of_perpendicular(
            &Point::at(0.0, 0.0, 0.0),
            &Point::at(10.0, 0.0, 0.0),
            PlanePoint { x: 15.0, y: 5.0 },
        );
        assert!(foot.is_none());
    }
}
