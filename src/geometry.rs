//! 2-D/3-D points and the limb-segment crossing test.
//!
//! The crossing test is used to recognise an "arms crossed" pose feature:
//! the left elbow→hand segment against the right elbow→hand segment,
//! projected to the x/y plane.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Project onto the x/y plane (drop depth).
    pub fn xy(&self) -> Point2 {
        Point2 {
            x: self.x,
            y: self.y,
        }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

// Segments closer to axis-aligned vertical than this are handled on the
// vertical branch to keep the slope-intercept solve away from a zero divisor.
const VERTICAL_EPS: f32 = 1e-6;

// z-component of (a2-a1) x (p-a1); sign tells which side of a1→a2 p lies on
fn orient(a1: Point2, a2: Point2, p: Point2) -> f32 {
    (a2.x - a1.x) * (p.y - a1.y) - (a2.y - a1.y) * (p.x - a1.x)
}

/// True when segment a1–a2 crosses segment b1–b2 (touching endpoints count).
pub fn segments_cross(a1: Point2, a2: Point2, b1: Point2, b2: Point2) -> bool {
    let v1 = orient(a1, a2, b1);
    let v2 = orient(a1, a2, b2);
    let m1 = orient(b1, b2, a1);
    let m2 = orient(b1, b2, a2);
    v1 * v2 <= 0.0 && m1 * m2 <= 0.0
}

fn slope_intercept(p1: Point2, p2: Point2) -> (f32, f32) {
    let slope = (p1.y - p2.y) / (p1.x - p2.x);
    let intercept = (p1.x * p2.y - p1.y * p2.x) / (p1.x - p2.x);
    (slope, intercept)
}

/// Intersection point of two crossing segments, or `None` when they do not
/// cross or the crossing has no single well-defined point (collinear
/// overlap, two vertical segments).
///
/// Vertical segments get their own branch using the vertical segment's x
/// coordinate instead of a slope.
pub fn crossing_point(a1: Point2, a2: Point2, b1: Point2, b2: Point2) -> Option<Point2> {
    if !segments_cross(a1, a2, b1, b2) {
        return None;
    }

    let a_vertical = (a1.x - a2.x).abs() < VERTICAL_EPS;
    let b_vertical = (b1.x - b2.x).abs() < VERTICAL_EPS;

    match (a_vertical, b_vertical) {
        (true, true) => None,
        (true, false) => {
            let (slope, intercept) = slope_intercept(b1, b2);
            Some(Point2::new(a1.x, slope * a1.x + intercept))
        }
        (false, true) => {
            let (slope, intercept) = slope_intercept(a1, a2);
            Some(Point2::new(b1.x, slope * b1.x + intercept))
        }
        (false, false) => {
            let (sa, ia) = slope_intercept(a1, a2);
            let (sb, ib) = slope_intercept(b1, b2);
            if (sa - sb).abs() < VERTICAL_EPS {
                // collinear overlap; no single point
                return None;
            }
            let x = (ib - ia) / (sa - sb);
            Some(Point2::new(x, sa * x + ia))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point2 {
        Point2::new(x, y)
    }

    #[test]
    fn diagonal_cross_at_center() {
        let hit = crossing_point(p(0.0, 0.0), p(2.0, 2.0), p(0.0, 2.0), p(2.0, 0.0))
            .expect("segments cross");
        assert!((hit.x - 1.0).abs() < 1e-5);
        assert!((hit.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn parallel_segments_do_not_cross() {
        assert!(!segments_cross(
            p(0.0, 0.0),
            p(2.0, 0.0),
            p(0.0, 1.0),
            p(2.0, 1.0)
        ));
        assert!(crossing_point(p(0.0, 0.0), p(2.0, 0.0), p(0.0, 1.0), p(2.0, 1.0)).is_none());
    }

    #[test]
    fn disjoint_segments_do_not_cross() {
        assert!(!segments_cross(
            p(0.0, 0.0),
            p(1.0, 1.0),
            p(3.0, 0.0),
            p(4.0, 1.0)
        ));
    }

    #[test]
    fn vertical_segment_gets_its_own_branch() {
        let hit = crossing_point(p(1.0, 0.0), p(1.0, 2.0), p(0.0, 1.0), p(2.0, 1.0))
            .expect("segments cross");
        assert!((hit.x - 1.0).abs() < 1e-5);
        assert!((hit.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn vertical_second_segment() {
        let hit = crossing_point(p(0.0, 1.0), p(2.0, 1.0), p(1.0, 0.0), p(1.0, 2.0))
            .expect("segments cross");
        assert!((hit.x - 1.0).abs() < 1e-5);
        assert!((hit.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn two_vertical_segments_have_no_single_point() {
        assert!(crossing_point(p(1.0, 0.0), p(1.0, 2.0), p(1.0, 1.0), p(1.0, 3.0)).is_none());
    }

    #[test]
    fn point3_projects_to_xy() {
        let q = Point3::new(3.0, 4.0, 1500.0).xy();
        assert_eq!(q, p(3.0, 4.0));
    }
}
