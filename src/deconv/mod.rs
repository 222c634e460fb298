//! Top-down spectral deconvolution: decharging, isotope scoring, and peak
//! group discovery.
mod averagine;
mod engine;
mod peak_group;

pub use averagine::{IsotopeEnvelope, PrecalculatedAveragine};
pub use engine::{
    compute_qvalues, remove_overlapping_peak_groups, DeconvolutionConfig, SpectralDeconvolution,
};
pub use peak_group::{DeconvolvedSpectrum, FeatureSeed, PeakGroup, TargetDecoyType};
