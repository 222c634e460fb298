//! Isobaric reporter quantification: channel libraries, extraction of
//! reporter intensities, and isotope-impurity correction.
mod channels;
mod correction;
mod extractor;
mod nnls;

pub use channels::{
    IsobaricChannelInfo, IsobaricLabelingMethod, IsobaricQuantitationMethod,
    REPORTER_ISOTOPE_SPACING,
};
pub use correction::{correct_channel_intensities, impurity_matrix, CorrectionStats};
pub use extractor::{
    ExtractorSettings, IsobaricChannelExtractor, DEFAULT_SIBLING_CHANNEL_GUARD,
    MIN_REPORTER_MASS_SHIFT,
};
pub use nnls::nnls;
