//! Detected analytes and their linkage across maps.
mod consensus;
mod convex_hull;
#[allow(clippy::module_inception)]
mod feature;

pub use consensus::{
    ColumnHeader, ConsensusFeature, ConsensusMap, ExperimentType, FeatureHandle, SplitMode,
};
pub use convex_hull::ConvexHull;
pub use feature::{Feature, FeatureMap};
