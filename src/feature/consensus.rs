//! Consensus features: the same analyte linked across several input maps.
use std::io::Write;

use indexmap::IndexMap;
use log::warn;

use crate::meta::DataProcessing;
use crate::params::ParamList;
use crate::utils::{unique_id, INVALID_UNIQUE_ID};
use crate::impl_param_described;

use super::feature::{Feature, FeatureMap};

/// A reference to one constituent feature of a consensus feature.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FeatureHandle {
    /// The key of the originating column in the map's headers
    pub map_index: u64,
    /// The unique id of the referenced feature in its source map
    pub unique_id: u64,
    pub rt: f64,
    pub mz: f64,
    pub intensity: f32,
    pub charge: i32,
}

impl FeatureHandle {
    pub fn from_feature(map_index: u64, feature: &Feature) -> Self {
        Self {
            map_index,
            unique_id: feature.unique_id,
            rt: feature.rt,
            mz: feature.mz,
            intensity: feature.intensity,
            charge: feature.charge,
        }
    }
}

/// A consensus position plus the feature handles grouped under it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusFeature {
    pub rt: f64,
    pub mz: f64,
    pub intensity: f32,
    pub charge: i32,
    pub quality: f32,
    pub handles: Vec<FeatureHandle>,
    pub unique_id: u64,
    pub params: ParamList,
}

impl Default for ConsensusFeature {
    fn default() -> Self {
        Self {
            rt: 0.0,
            mz: 0.0,
            intensity: 0.0,
            charge: 0,
            quality: 0.0,
            handles: Vec::new(),
            unique_id: INVALID_UNIQUE_ID,
            params: ParamList::new(),
        }
    }
}

impl ConsensusFeature {
    pub fn new(rt: f64, mz: f64) -> Self {
        Self {
            rt,
            mz,
            unique_id: unique_id(),
            ..Default::default()
        }
    }

    pub fn insert(&mut self, handle: FeatureHandle) {
        self.handles.push(handle);
    }

    /// The per-handle intensity for a given column, zero if absent.
    pub fn intensity_for(&self, map_index: u64) -> f32 {
        self.handles
            .iter()
            .find(|h| h.map_index == map_index)
            .map(|h| h.intensity)
            .unwrap_or(0.0)
    }

    /// Recompute the consensus intensity as the sum over handles.
    pub fn compute_consensus(&mut self) {
        self.intensity = self.handles.iter().map(|h| h.intensity).sum();
        if let Some(first) = self.handles.first() {
            self.charge = first.charge;
        }
    }
}

impl_param_described!(ConsensusFeature);

/// Describes one column (input map) of a consensus map.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ColumnHeader {
    /// The source file name of the column
    pub filename: String,
    /// The label (channel name, tag) of the column, if any
    pub label: String,
    /// The number of elements in the original map
    pub size: usize,
    /// The unique id of the originating map
    pub unique_id: u64,
}

/// How the consensus was produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentType {
    #[default]
    LabelFree,
    LabeledMS1,
    LabeledMS2,
}

/// How map-level metadata is distributed when a consensus map is split
/// back into per-column feature maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Per-column maps get no consensus-level identifications.
    Discard,
    /// Every derived map receives a copy.
    CopyAll,
    /// Only the first derived map receives them.
    CopyFirst,
}

/// An ordered sequence of consensus features plus the column bookkeeping
/// that ties handle indices back to input maps.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConsensusMap {
    pub features: Vec<ConsensusFeature>,
    pub column_headers: IndexMap<u64, ColumnHeader>,
    pub experiment_type: ExperimentType,
    /// Identification records owned at the map level, by id string
    pub protein_ids: Vec<String>,
    pub peptide_ids: Vec<String>,
    pub data_processing: Vec<DataProcessing>,
    pub params: ParamList,
}

impl ConsensusMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn push(&mut self, feature: ConsensusFeature) {
        self.features.push(feature);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConsensusFeature> {
        self.features.iter()
    }

    pub fn sort_by_position(&mut self) {
        self.features.sort_by(|a, b| {
            a.rt.total_cmp(&b.rt).then_with(|| a.mz.total_cmp(&b.mz))
        });
    }

    /// Concatenate `other`'s rows. The column-header sets must agree; rows
    /// from `other` keep their handles unchanged.
    pub fn append_rows(&mut self, other: &ConsensusMap) -> Result<(), String> {
        if self.column_headers != other.column_headers {
            return Err("cannot append rows: column headers differ".to_string());
        }
        self.features.extend(other.features.iter().cloned());
        self.protein_ids.extend(other.protein_ids.iter().cloned());
        self.peptide_ids.extend(other.peptide_ids.iter().cloned());
        Ok(())
    }

    /// Union the column sets, re-keying `other`'s columns where its map
    /// indices collide with ours, and take over its features as rows of the
    /// widened map.
    pub fn append_columns(&mut self, other: &ConsensusMap) {
        let mut remap: IndexMap<u64, u64> = IndexMap::new();
        let mut next_free = self
            .column_headers
            .keys()
            .max()
            .map(|k| k + 1)
            .unwrap_or(0);
        for (&index, header) in other.column_headers.iter() {
            let target = if self.column_headers.contains_key(&index) {
                let assigned = next_free;
                next_free += 1;
                assigned
            } else {
                index
            };
            remap.insert(index, target);
            self.column_headers.insert(target, header.clone());
        }
        for feature in other.features.iter() {
            let mut copy = feature.clone();
            for handle in copy.handles.iter_mut() {
                if let Some(&target) = remap.get(&handle.map_index) {
                    handle.map_index = target;
                }
            }
            self.features.push(copy);
        }
        self.protein_ids.extend(other.protein_ids.iter().cloned());
        self.peptide_ids.extend(other.peptide_ids.iter().cloned());
    }

    /// Reconstruct one [`FeatureMap`] per column. `mode` controls where the
    /// consensus-level identification records go.
    pub fn split(&self, mode: SplitMode) -> Vec<FeatureMap> {
        let mut maps: IndexMap<u64, FeatureMap> = self
            .column_headers
            .keys()
            .map(|&k| (k, FeatureMap::new()))
            .collect();
        for feature in self.features.iter() {
            for handle in feature.handles.iter() {
                if let Some(map) = maps.get_mut(&handle.map_index) {
                    map.push(Feature {
                        rt: handle.rt,
                        mz: handle.mz,
                        intensity: handle.intensity,
                        charge: handle.charge,
                        unique_id: handle.unique_id,
                        ..Default::default()
                    });
                }
            }
        }
        let mut out: Vec<FeatureMap> = maps.into_values().collect();
        match mode {
            SplitMode::Discard => {}
            SplitMode::CopyAll => {
                for map in out.iter_mut() {
                    map.protein_ids = self.protein_ids.clone();
                    map.peptide_ids = self.peptide_ids.clone();
                }
            }
            SplitMode::CopyFirst => {
                if let Some(first) = out.first_mut() {
                    first.protein_ids = self.protein_ids.clone();
                    first.peptide_ids = self.peptide_ids.clone();
                }
            }
        }
        out
    }

    /// Verify the handle/header linkage: every handle's `map_index` must be
    /// declared, and no two headers may share (filename, label). Violations
    /// are reported to `diagnostics` when given.
    pub fn is_map_consistent(&self, mut diagnostics: Option<&mut dyn Write>) -> bool {
        let mut consistent = true;
        let mut report = |message: String| {
            warn!("{}", message);
            if let Some(sink) = diagnostics.as_deref_mut() {
                let _ = writeln!(sink, "{}", message);
            }
        };

        let mut seen: Vec<(&str, &str)> = Vec::new();
        for header in self.column_headers.values() {
            let key = (header.filename.as_str(), header.label.as_str());
            if seen.contains(&key) {
                consistent = false;
                report(format!(
                    "duplicate column header (filename '{}', label '{}')",
                    header.filename, header.label
                ));
            }
            seen.push(key);
        }

        for (i, feature) in self.features.iter().enumerate() {
            for handle in feature.handles.iter() {
                if !self.column_headers.contains_key(&handle.map_index) {
                    consistent = false;
                    report(format!(
                        "feature {} references undeclared map index {}",
                        i, handle.map_index
                    ));
                }
            }
        }
        consistent
    }
}

impl_param_described!(ConsensusMap);

#[cfg(test)]
mod test {
    use super::*;

    fn header(filename: &str, label: &str) -> ColumnHeader {
        ColumnHeader {
            filename: filename.to_string(),
            label: label.to_string(),
            size: 0,
            unique_id: unique_id(),
        }
    }

    fn two_column_map() -> ConsensusMap {
        let mut map = ConsensusMap::new();
        map.column_headers.insert(0, header("a.mzML", "114"));
        map.column_headers.insert(1, header("a.mzML", "115"));
        let mut cf = ConsensusFeature::new(10.0, 500.0);
        cf.insert(FeatureHandle {
            map_index: 0,
            unique_id: 1,
            rt: 10.0,
            mz: 500.0,
            intensity: 100.0,
            charge: 2,
        });
        cf.insert(FeatureHandle {
            map_index: 1,
            unique_id: 2,
            rt: 10.0,
            mz: 500.0,
            intensity: 50.0,
            charge: 2,
        });
        cf.compute_consensus();
        map.push(cf);
        map
    }

    #[test]
    fn test_consistency() {
        let map = two_column_map();
        assert!(map.is_map_consistent(None));

        let mut broken = map.clone();
        broken.features[0].handles[0].map_index = 99;
        let mut log = Vec::new();
        assert!(!broken.is_map_consistent(Some(&mut log)));
        assert!(String::from_utf8(log).unwrap().contains("99"));

        let mut dup = map.clone();
        let copy = dup.column_headers[&0].clone();
        dup.column_headers.insert(1, copy);
        assert!(!dup.is_map_consistent(None));
    }

    #[test]
    fn test_append_rows_requires_same_columns() {
        let mut left = two_column_map();
        let right = two_column_map();
        let before = left.len();
        left.append_rows(&right).unwrap();
        assert_eq!(left.len(), before + right.len());
        assert_eq!(left.column_headers.len(), 2);

        let mut narrow = ConsensusMap::new();
        narrow.column_headers.insert(0, header("b.mzML", ""));
        assert!(narrow.append_rows(&right).is_err());
    }

    #[test]
    fn test_append_columns_rekeys_collisions() {
        let mut left = two_column_map();
        let right = two_column_map();
        left.append_columns(&right);
        assert_eq!(left.column_headers.len(), 4);
        assert!(left.is_map_consistent(None));
        // The re-keyed rows must not point at the old indices.
        let rekeyed = &left.features[1];
        let mut indices: Vec<u64> = rekeyed.handles.iter().map(|h| h.map_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![2, 3]);
    }

    #[test]
    fn test_split_modes() {
        let mut map = two_column_map();
        map.protein_ids.push("prot_1".to_string());

        let discarded = map.split(SplitMode::Discard);
        assert_eq!(discarded.len(), 2);
        assert_eq!(discarded[0].len(), 1);
        assert!(discarded[0].protein_ids.is_empty());
        assert_eq!(discarded[0].features[0].intensity, 100.0);
        assert_eq!(discarded[1].features[0].intensity, 50.0);

        let all = map.split(SplitMode::CopyAll);
        assert!(all.iter().all(|m| m.protein_ids == vec!["prot_1".to_string()]));

        let first = map.split(SplitMode::CopyFirst);
        assert!(!first[0].protein_ids.is_empty());
        assert!(first[1].protein_ids.is_empty());
    }
}
