//! A detected analyte: a (RT, m/z) position with intensity, charge,
//! quality, convex hulls and optional subordinate features.
use crate::params::ParamList;
use crate::range::RangeManager;
use crate::utils::{unique_id, INVALID_UNIQUE_ID};
use crate::impl_param_described;

use super::convex_hull::ConvexHull;

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub rt: f64,
    pub mz: f64,
    pub intensity: f32,
    pub charge: i32,
    /// Overall goodness of the model fit, in [0, 1]
    pub overall_quality: f32,
    /// Per-dimension fit quality: (RT, m/z)
    pub qualities: [f32; 2],
    /// One hull per isotope trace
    pub convex_hulls: Vec<ConvexHull>,
    /// Features this feature was assembled from, e.g. in two-stage finders
    pub subordinates: Vec<Feature>,
    /// Identification references attached at the map level, by id string
    pub peptide_ids: Vec<String>,
    pub unique_id: u64,
    pub params: ParamList,
}

impl Default for Feature {
    fn default() -> Self {
        Self {
            rt: 0.0,
            mz: 0.0,
            intensity: 0.0,
            charge: 0,
            overall_quality: 0.0,
            qualities: [0.0, 0.0],
            convex_hulls: Vec::new(),
            subordinates: Vec::new(),
            peptide_ids: Vec::new(),
            unique_id: INVALID_UNIQUE_ID,
            params: ParamList::new(),
        }
    }
}

impl Feature {
    pub fn new(rt: f64, mz: f64, intensity: f32) -> Self {
        Self {
            rt,
            mz,
            intensity,
            unique_id: unique_id(),
            ..Default::default()
        }
    }

    pub fn has_unique_id(&self) -> bool {
        self.unique_id != INVALID_UNIQUE_ID
    }

    pub fn ensure_unique_id(&mut self) -> u64 {
        if !self.has_unique_id() {
            self.unique_id = unique_id();
        }
        self.unique_id
    }

    /// Add the convex envelope of the given (rt, mz) points as a new mass
    /// trace hull.
    pub fn add_convex_hull(&mut self, points: &[(f64, f64)]) {
        self.convex_hulls.push(ConvexHull::from_points(points));
    }

    /// The envelope of all hulls, or the feature's own point if it has
    /// none.
    pub fn bounds(&self) -> crate::range::BoundingBox {
        let mut bounds = crate::range::BoundingBox::empty();
        if self.convex_hulls.is_empty() {
            bounds.extend_to((self.rt, self.mz));
        } else {
            for hull in &self.convex_hulls {
                bounds = bounds.united(hull.bounding_box());
            }
        }
        bounds
    }
}

impl_param_described!(Feature);

/// An ordered collection of features from one map, with range bookkeeping.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeatureMap {
    pub features: Vec<Feature>,
    /// Identification records owned at the map level, by id string
    pub protein_ids: Vec<String>,
    pub peptide_ids: Vec<String>,
    pub params: ParamList,
    ranges: RangeManager,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn sort_by_position(&mut self) {
        self.features.sort_by(|a, b| {
            a.rt.total_cmp(&b.rt).then_with(|| a.mz.total_cmp(&b.mz))
        });
    }

    pub fn update_ranges(&mut self) {
        let features = &self.features;
        self.ranges.update_ranges(
            features
                .iter()
                .map(|f| (f.rt, f.mz, f.intensity as f64)),
        );
    }

    pub fn ranges(&self) -> &RangeManager {
        &self.ranges
    }

    /// Assign fresh unique ids to any feature lacking one.
    pub fn ensure_unique_ids(&mut self) {
        for feature in self.features.iter_mut() {
            feature.ensure_unique_id();
        }
    }
}

impl_param_described!(FeatureMap);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_feature_identity() {
        let a = Feature::new(10.0, 500.0, 1e4);
        let b = Feature::new(10.0, 500.0, 1e4);
        assert!(a.has_unique_id());
        assert_ne!(a.unique_id, b.unique_id);

        let mut blank = Feature::default();
        assert!(!blank.has_unique_id());
        blank.ensure_unique_id();
        assert!(blank.has_unique_id());
    }

    #[test]
    fn test_hulls_and_bounds() {
        let mut feature = Feature::new(10.0, 500.0, 1e4);
        feature.add_convex_hull(&[(9.5, 500.0), (10.5, 500.1), (10.0, 499.9)]);
        feature.add_convex_hull(&[(9.6, 501.0), (10.4, 501.1), (10.0, 500.9)]);
        assert_eq!(feature.convex_hulls.len(), 2);
        let bounds = feature.bounds();
        assert_eq!(bounds.rt.min(), 9.5);
        assert_eq!(bounds.mz.max(), 501.1);
    }

    #[test]
    fn test_map_sort_and_ranges() {
        let mut map = FeatureMap::new();
        map.push(Feature::new(20.0, 300.0, 10.0));
        map.push(Feature::new(10.0, 700.0, 20.0));
        map.sort_by_position();
        assert_eq!(map.features[0].rt, 10.0);
        map.update_ranges();
        assert_eq!(map.ranges().rt.min(), 10.0);
        assert_eq!(map.ranges().mz.max(), 700.0);
        assert_eq!(map.ranges().intensity.max(), 20.0);
    }
}
