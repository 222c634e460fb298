//! Convex hulls around feature mass traces in (RT, m/z) space.
use crate::range::BoundingBox;

/// A convex polygon enclosing the points of one mass trace. Vertices are
/// kept in counter-clockwise order starting from the lexicographically
/// smallest point.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConvexHull {
    points: Vec<(f64, f64)>,
    bounds: BoundingBox,
}

const CONTAINMENT_TOLERANCE: f64 = 1e-9;

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

impl ConvexHull {
    /// Build the convex envelope of `points` by the monotone-chain method.
    /// Collinear boundary points are dropped.
    pub fn from_points(points: &[(f64, f64)]) -> Self {
        let mut bounds = BoundingBox::empty();
        for p in points {
            bounds.extend_to(*p);
        }
        let mut sorted: Vec<(f64, f64)> = points.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        sorted.dedup();
        if sorted.len() <= 2 {
            return Self {
                points: sorted,
                bounds,
            };
        }

        let mut hull: Vec<(f64, f64)> = Vec::with_capacity(sorted.len() * 2);
        for &p in sorted.iter() {
            while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
                hull.pop();
            }
            hull.push(p);
        }
        let lower_len = hull.len() + 1;
        for &p in sorted.iter().rev() {
            while hull.len() >= lower_len
                && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
            {
                hull.pop();
            }
            hull.push(p);
        }
        hull.pop();
        Self {
            points: hull,
            bounds,
        }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point-in-polygon within numerical tolerance. Degenerate hulls test
    /// against their bounding box.
    pub fn encloses(&self, point: (f64, f64)) -> bool {
        if self.points.len() < 3 {
            return self.bounds.encloses(point);
        }
        let n = self.points.len();
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            if cross(a, b, point) < -CONTAINMENT_TOLERANCE {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hull_contains_all_inputs() {
        let points = vec![
            (1.0, 100.0),
            (2.0, 101.0),
            (1.5, 100.5),
            (3.0, 100.0),
            (2.0, 99.0),
            (1.0, 99.5),
        ];
        let hull = ConvexHull::from_points(&points);
        assert!(hull.points().len() >= 3);
        for p in &points {
            assert!(hull.encloses(*p), "{:?} escaped the hull", p);
        }
        assert!(!hull.encloses((10.0, 100.0)));
    }

    #[test]
    fn test_hull_is_convex() {
        let points: Vec<(f64, f64)> = (0..20)
            .map(|i| {
                let a = i as f64 * 0.7;
                (a.cos(), a.sin())
            })
            .collect();
        let hull = ConvexHull::from_points(&points);
        let verts = hull.points();
        let n = verts.len();
        for i in 0..n {
            let c = cross(verts[i], verts[(i + 1) % n], verts[(i + 2) % n]);
            assert!(c > 0.0, "vertex order not counter-clockwise convex");
        }
    }

    #[test]
    fn test_degenerate_hulls() {
        let hull = ConvexHull::from_points(&[(1.0, 2.0)]);
        assert_eq!(hull.points().len(), 1);
        assert!(hull.encloses((1.0, 2.0)));

        let hull = ConvexHull::from_points(&[(1.0, 2.0), (3.0, 2.0)]);
        assert_eq!(hull.points().len(), 2);
        assert!(hull.encloses((2.0, 2.0)));
    }
}
