//! `mzproc` is a raw mass spectrometry processing core in Rust.
//!
//! It provides the pieces a quantification or deconvolution tool is built
//! from:
//!   1. A spectrum/feature data model with range bookkeeping in
//!      [`spectrum`], [`experiment`] and [`feature`]
//!   2. Indexed mzML reading and writing using [`MzMLReader`] and
//!      [`MzMLWriter`] in [`mzproc::io::mzml`](crate::io::mzml), including
//!      the numeric array compressions
//!   3. A lazily-loaded experiment over the mzML index with
//!      [`OnDiscMSExperiment`]
//!   4. Composable spectrum/peak predicates in [`filtering`]
//!   5. Isobaric reporter quantification with NNLS impurity correction in
//!      [`quant`]
//!   6. Top-down spectral deconvolution in [`deconv`]
//!
//! # Example
//! ```no_run
//! use mzproc::MzMLReader;
//!
//! let mut reader = MzMLReader::from_path("./test/data/small.mzML").unwrap();
//! let experiment = reader.read_experiment().unwrap();
//! for spectrum in &experiment {
//!     println!("Scan {} with {} peaks", spectrum.id(), spectrum.len());
//! }
//! ```
//!
//! Configuration of the algorithmic components goes through plain structs
//! ([`quant::ExtractorSettings`], [`deconv::DeconvolutionConfig`]); the
//! [`config`] module supplies the hierarchical parameter-tree façade used
//! by embedding tools, with a lossless XML round trip.
pub mod config;
pub mod cv;
pub mod deconv;
pub mod error;
pub mod experiment;
pub mod feature;
pub mod filtering;
pub mod io;
pub mod meta;
#[macro_use]
pub mod params;
pub mod peaks;
pub mod prelude;
pub mod progress;
pub mod quant;
pub mod range;
pub mod spectrum;
pub mod utils;

pub use crate::error::{CoreContext, CoreError};
pub use crate::experiment::MSExperiment;
pub use crate::io::{MzMLReader, MzMLWriter, OnDiscMSExperiment};
pub use crate::params::{Param, ParamList};
pub use crate::spectrum::{Chromatogram, Spectrum};
