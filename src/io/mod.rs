//! Reading and writing mass spectrometry data files.
pub mod feature_xml;
pub mod mzml;
mod offset_index;
mod ondisc;

pub use feature_xml::{
    read_consensus_map, read_feature_map, write_consensus_map, write_feature_map, FeatureXmlError,
};
pub use mzml::{MzMLParserError, MzMLReader, MzMLWriter, MzMLWriterError};
pub use offset_index::OffsetIndex;
pub use ondisc::OnDiscMSExperiment;
