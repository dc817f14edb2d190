//! Bounded recent-history buffer of a tracked point's positions.
//!
//! Feeds trail rendering; cleared when the owning user track stops.

use std::collections::VecDeque;

use crate::geometry::Point3;

#[derive(Debug, Clone)]
pub struct Trail {
    points: VecDeque<Point3>,
    capacity: usize,
}

impl Trail {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append at the tail; the oldest point falls off once full.
    pub fn push(&mut self, point: Point3) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Point3> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&Point3> {
        self.points.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(i: usize) -> Point3 {
        Point3::new(i as f32, 0.0, 0.0)
    }

    #[test]
    fn keeps_last_n_in_order() {
        let mut trail = Trail::new(5);
        for i in 0..8 {
            trail.push(pt(i));
        }
        assert_eq!(trail.len(), 5);
        let xs: Vec<f32> = trail.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(trail.latest().unwrap().x, 7.0);
    }

    #[test]
    fn clear_empties_iteration() {
        let mut trail = Trail::new(4);
        trail.push(pt(1));
        trail.push(pt(2));
        trail.clear();
        assert!(trail.is_empty());
        assert_eq!(trail.iter().count(), 0);
    }

    #[test]
    fn iteration_is_restartable() {
        let mut trail = Trail::new(3);
        trail.push(pt(1));
        trail.push(pt(2));
        assert_eq!(trail.iter().count(), 2);
        assert_eq!(trail.iter().count(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut trail = Trail::new(0);
        trail.push(pt(1));
        assert_eq!(trail.len(), 1);
    }
}
