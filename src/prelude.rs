//! A prelude of the traits needed to work with the data model
//! ergonomically.
pub use crate::filtering::{PeakPredicate, SpectrumPredicate};
pub use crate::params::ParamDescribed;
