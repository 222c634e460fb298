//! The spectrum-level data model: descriptions, peak containers,
//! chromatograms and binary data arrays.
pub mod bindata;
mod chromatogram;
mod description;
#[allow(clippy::module_inception)]
mod spectrum;

pub use bindata::{BinaryArrayMap, DataArray};
pub use chromatogram::Chromatogram;
pub use description::{
    Activation, ChromatogramDescription, ChromatogramType, DissociationMethod, IsolationWindow,
    Precursor, ScanEvent, ScanMode, ScanPolarity, ScanWindow, SelectedIon, SpectrumDescription,
};
pub use spectrum::{FloatDataArray, IntegerDataArray, Spectrum, StringDataArray};
