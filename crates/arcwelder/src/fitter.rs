//! Rolling point buffer and the segmented arc fitter.

use std::collections::VecDeque;

use crate::config::WelderConfig;
use crate::geometry::{approx_equal, approx_zero, circle_fits_points, Arc, Circle, Point};

/// Outcome of offering a point to the fitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// The point extends the current candidate arc (or anchors a new one).
    Added,
    /// The point cannot join the candidate arc.
    Rejected,
    /// The buffer is at capacity; the caller must commit or flush first.
    BufferFull,
}

/// Bounded deque of candidate arc samples in traversal order.
#[derive(Debug)]
pub struct PointBuffer {
    points: VecDeque<Point>,
    capacity: usize,
}

impl PointBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of buffered points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the buffer holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the buffer is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.points.len() >= self.capacity
    }

    /// Appends a point; a full buffer drops the request.
    pub fn push_back(&mut self, point: Point) {
        if !self.is_full() {
            self.points.push_back(point);
        }
    }

    /// Removes and returns the oldest point.
    pub fn pop_front(&mut self) -> Option<Point> {
        self.points.pop_front()
    }

    /// Removes and returns the newest point.
    pub fn pop_back(&mut self) -> Option<Point> {
        self.points.pop_back()
    }

    /// The point at `index`, oldest first.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    /// The oldest point.
    #[must_use]
    pub fn front(&self) -> Option<&Point> {
        self.points.front()
    }

    /// The newest point.
    #[must_use]
    pub fn back(&self) -> Option<&Point> {
        self.points.back()
    }

    fn clear(&mut self) {
        self.points.clear();
    }

    fn make_slice(&mut self) -> &[Point] {
        self.points.make_contiguous()
    }
}

/// Incremental arc fitter over a rolling window of points.
///
/// The first buffered point is the anchor: the endpoint of whatever was
/// last written. Points after it are tentative until an arc is committed
/// or the window is flushed. `e_relative_total` sums the filament deltas of
/// every non-anchor point.
#[derive(Debug)]
pub struct ArcFitter {
    buffer: PointBuffer,
    circle: Option<Circle>,
    shape_length: f64,
    e_relative_total: f64,
    resolution_mm: f64,
    path_tolerance_percent: f64,
    max_radius_mm: f64,
    min_segments: usize,
    max_segments: usize,
    allow_3d_arcs: bool,
}

impl ArcFitter {
    /// Creates a fitter from the run configuration.
    #[must_use]
    pub fn new(config: &WelderConfig) -> Self {
        Self {
            buffer: PointBuffer::new(config.max_arc_segments),
            circle: None,
            shape_length: 0.0,
            e_relative_total: 0.0,
            resolution_mm: config.resolution_mm,
            path_tolerance_percent: config.path_tolerance_percent,
            max_radius_mm: config.max_radius_mm,
            min_segments: config.min_arc_segments,
            max_segments: config.max_arc_segments,
            allow_3d_arcs: config.allow_3d_arcs,
        }
    }

    /// Number of buffered points, anchor included.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffered points form a committable arc.
    #[must_use]
    pub fn is_shape(&self) -> bool {
        self.circle.is_some() && self.buffer.len() >= self.min_segments
    }

    /// Sum of filament deltas of the non-anchor points.
    #[must_use]
    pub fn e_relative_total(&self) -> f64 {
        self.e_relative_total
    }

    /// Sum of XY chord lengths between consecutive buffered points.
    #[must_use]
    pub fn shape_length(&self) -> f64 {
        self.shape_length
    }

    /// The newest buffered point.
    #[must_use]
    pub fn last_point(&self) -> Option<Point> {
        self.buffer.back().copied()
    }

    /// Offers a point to the current candidate arc.
    ///
    /// An empty buffer accepts unconditionally (the anchor). Otherwise the
    /// point must keep every buffered sample within `resolution_mm` of a
    /// common circle whose arc length stays within the path tolerance.
    /// Before a shape has formed, a failed extension slides the window
    /// forward once (dropping the anchor) and retries.
    pub fn try_add_point(&mut self, point: Point) -> AddResult {
        if self.buffer.is_empty() {
            self.buffer.push_back(point);
            return AddResult::Added;
        }
        if self.buffer.len() >= self.max_segments {
            return AddResult::BufferFull;
        }

        let mut retried = false;
        loop {
            let Some(prev) = self.buffer.back().copied() else {
                return AddResult::Rejected;
            };
            let distance = prev.xy_distance(&point);
            if approx_zero(distance) {
                return AddResult::Rejected;
            }
            if !self.allow_3d_arcs && !approx_equal(prev.z, point.z) {
                return AddResult::Rejected;
            }

            let added = if self.buffer.len() < self.min_segments - 1 {
                self.buffer.push_back(point);
                self.shape_length += distance;
                true
            } else {
                self.try_extend(point, distance)
            };

            if added {
                self.e_relative_total += point.e_relative;
                return AddResult::Added;
            }

            // No shape yet: drop the anchor and retry once with the window
            // moved forward.
            if !retried && self.buffer.len() > 1 && self.buffer.len() < self.min_segments {
                self.slide_anchor();
                retried = true;
                continue;
            }
            return AddResult::Rejected;
        }
    }

    /// The currently fitted arc, when the buffer holds a valid shape.
    pub fn current_arc(&mut self) -> Option<Arc> {
        let circle = self.circle?;
        if self.buffer.len() < self.min_segments {
            return None;
        }
        let shape_length = self.shape_length;
        let tolerance = self.path_tolerance_percent;
        let allow_3d = self.allow_3d_arcs;
        Arc::fit(
            &circle,
            self.buffer.make_slice(),
            shape_length,
            tolerance,
            allow_3d,
        )
    }

    /// Commits the fitted arc and re-anchors the fitter at its endpoint.
    pub fn commit(&mut self) -> Option<Arc> {
        let arc = self.current_arc()?;
        self.reset_to(arc.end);
        Some(arc)
    }

    /// Abandons the candidate arc, re-anchoring at the newest point.
    pub fn abort(&mut self) {
        let anchor = self.buffer.back().copied();
        self.buffer.clear();
        self.circle = None;
        self.shape_length = 0.0;
        self.e_relative_total = 0.0;
        if let Some(anchor) = anchor {
            self.buffer.push_back(anchor);
        }
    }

    /// Resets the fitter with `anchor` as its only buffered point.
    pub fn reset_to(&mut self, anchor: Point) {
        self.buffer.clear();
        self.circle = None;
        self.shape_length = 0.0;
        self.e_relative_total = 0.0;
        self.buffer.push_back(anchor);
    }

    fn try_extend(&mut self, point: Point, distance: f64) -> bool {
        let mid_index = (self.buffer.len() - 1) / 2 + 1;
        let (Some(anchor), Some(mid)) = (self.buffer.get(0), self.buffer.get(mid_index)) else {
            return false;
        };

        // A degenerate three-point construction (the candidate closing onto
        // the anchor of a full circle) falls back to the current hypothesis.
        let test_circle =
            match Circle::from_three_points(anchor, mid, &point, self.max_radius_mm) {
                Ok(circle) => circle,
                Err(_) => match self.circle {
                    Some(circle) => circle,
                    None => return false,
                },
            };

        self.buffer.push_back(point);
        self.shape_length += distance;

        let resolution = self.resolution_mm;
        let tolerance = self.path_tolerance_percent;
        let shape_length = self.shape_length;
        let allow_3d = self.allow_3d_arcs;
        let points = self.buffer.make_slice();
        let fits = circle_fits_points(&test_circle, points, resolution)
            && Arc::fit(&test_circle, points, shape_length, tolerance, allow_3d).is_some();

        if fits {
            self.circle = Some(test_circle);
            true
        } else {
            self.buffer.pop_back();
            self.shape_length -= distance;
            false
        }
    }

    fn slide_anchor(&mut self) {
        let Some(old_anchor) = self.buffer.pop_front() else {
            return;
        };
        let Some(new_anchor) = self.buffer.front().copied() else {
            return;
        };
        self.shape_length -= old_anchor.xy_distance(&new_anchor);
        self.e_relative_total -= new_anchor.e_relative;
    }
}
